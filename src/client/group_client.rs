use crate::common::protocol::{ClientMessage, ServerMessage};
use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Client TCP minimale: una richiesta JSON per riga, attende la risposta.
pub struct GroupClient {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl GroupClient {
    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
        })
    }

    /// Invia una riga grezza (anche non valida) e restituisce la risposta decodificata.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<ServerMessage> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        let mut response = String::new();
        let n = timeout(RESPONSE_TIMEOUT, self.reader.read_line(&mut response))
            .await
            .map_err(|_| anyhow::anyhow!("Timed out waiting for server response"))??;
        if n == 0 {
            return Err(anyhow::anyhow!("Server closed the connection"));
        }
        debug!("[CLIENT] <- {}", response.trim());
        Ok(serde_json::from_str(response.trim())?)
    }

    pub async fn send(&mut self, msg: &ClientMessage) -> anyhow::Result<ServerMessage> {
        let line = serde_json::to_string(msg)?;
        debug!("[CLIENT] -> {}", msg.name());
        self.send_raw(&line).await
    }
}
