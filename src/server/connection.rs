use crate::common::protocol::{ClientMessage, ErrorKind, LeaveOutcome, ServerMessage};
use crate::server::config::ServerConfig;
use crate::server::database::Database;
use crate::server::error::{ServiceError, ServiceResult};
use crate::server::{auth, groups, membership, shopping};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::BufReader as StdBufReader;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpListener;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

// Optional TLS
use rustls::ServerConfig as RustlsConfig;
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};
use tokio_rustls::TlsAcceptor;

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, response: &ServerMessage) -> anyhow::Result<()> {
    let mut payload = serde_json::to_string(response)?;
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[derive(Clone)]
pub struct Server {
    pub db: Arc<Database>,
    pub config: ServerConfig,
}

impl Server {
    pub fn new(db: Arc<Database>, config: ServerConfig) -> Self {
        Self { db, config }
    }

    /// Configure the TLS acceptor from the certificate/key paths in the config
    fn setup_tls_acceptor(&self) -> anyhow::Result<Option<TlsAcceptor>> {
        if !self.config.enable_tls {
            return Ok(None);
        }

        let cert_path = self
            .config
            .tls_cert_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("TLS_CERT_PATH environment variable not set"))?;
        let key_path = self
            .config
            .tls_key_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("TLS_KEY_PATH environment variable not set"))?;
        info!("[TLS] Loading certificate from {} and key from {}", cert_path, key_path);

        let cert_file = File::open(cert_path)
            .map_err(|e| anyhow::anyhow!("Failed to open certificate file '{}': {}", cert_path, e))?;
        let cert_chain = certs(&mut StdBufReader::new(cert_file))?
            .into_iter()
            .map(rustls::Certificate)
            .collect::<Vec<_>>();
        if cert_chain.is_empty() {
            return Err(anyhow::anyhow!("No certificates found in {}", cert_path));
        }

        let key_file = File::open(key_path)
            .map_err(|e| anyhow::anyhow!("Failed to open private key file '{}': {}", key_path, e))?;
        let mut keys = pkcs8_private_keys(&mut StdBufReader::new(key_file))?;
        if keys.is_empty() {
            // Fallback to RSA keys
            let key_file = File::open(key_path)?;
            keys = rsa_private_keys(&mut StdBufReader::new(key_file))?;
        }
        if keys.is_empty() {
            return Err(anyhow::anyhow!("No private keys found in {}", key_path));
        }

        let priv_key = rustls::PrivateKey(keys.remove(0));
        let rustls_cfg = RustlsConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(cert_chain, priv_key)
            .map_err(|e| anyhow::anyhow!("TLS configuration error: {}", e))?;

        info!("[TLS] TLS configuration successful");
        Ok(Some(TlsAcceptor::from(Arc::new(rustls_cfg))))
    }

    pub async fn run(&self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("[SERVER] Listening on {}", addr);
        self.serve(listener).await
    }

    /// Accept loop on an already bound listener; one task per connection.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        // A TLS misconfiguration must not silently downgrade to plain TCP
        let tls_acceptor = self.setup_tls_acceptor()?;
        if tls_acceptor.is_some() {
            info!("[TLS] TLS enabled");
        }

        loop {
            let (stream, peer) = listener.accept().await?;
            info!("[SERVER] New connection from {}", peer);
            let server = self.clone();
            let acceptor = tls_acceptor.clone();
            tokio::spawn(async move {
                let res = match acceptor {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(tls_stream) => server.handle_client(tls_stream, peer).await,
                        Err(e) => {
                            warn!("[SERVER] TLS accept failed for {}: {}", peer, e);
                            return;
                        }
                    },
                    None => server.handle_client(stream, peer).await,
                };
                if let Err(e) = res {
                    warn!("[SERVER] Client error ({}): {}", peer, e);
                }
            });
        }
    }

    /// Line protocol: one JSON request per line, one JSON response per line.
    async fn handle_client<S>(&self, stream: S, peer: std::net::SocketAddr) -> anyhow::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        // The codec stops buffering at the limit instead of waiting for a newline
        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(self.config.max_request_length));
        let mut writer = BufWriter::new(writer);
        while let Some(frame) = lines.next().await {
            let line = match frame {
                Ok(line) => line,
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!("[SERVER] Request from {} exceeds {} bytes, closing", peer, self.config.max_request_length);
                    let response = ServiceError::Validation("Request too large".into()).into_message();
                    write_response(&mut writer, &response).await?;
                    return Ok(());
                }
                Err(LinesCodecError::Io(e)) => return Err(e.into()),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let response = self.handle_line(trimmed).await;
            write_response(&mut writer, &response).await?;
        }
        info!("[SERVER] Client disconnected: {}", peer);
        Ok(())
    }

    /// Decodifica una riga e la esegue; una riga malformata è un errore di validazione.
    pub async fn handle_line(&self, line: &str) -> ServerMessage {
        match serde_json::from_str::<ClientMessage>(line) {
            Ok(msg) => self.handle_message(msg).await,
            Err(e) => {
                debug!("[SERVER] Malformed request: {}", e);
                ServiceError::Validation(format!("Malformed request: {}", e)).into_message()
            }
        }
    }

    pub async fn handle_message(&self, msg: ClientMessage) -> ServerMessage {
        let command = msg.name();
        debug!("[SERVER] Received command: {}", command);
        match self.dispatch(msg).await {
            Ok(response) => response,
            Err(e) => {
                if e.kind() == ErrorKind::Internal {
                    error!("[SERVER] {} failed: {}", command, e);
                } else {
                    debug!("[SERVER] {} rejected: {}", command, e);
                }
                e.into_message()
            }
        }
    }

    /// Risolve la sessione; va chiamata prima di qualunque altro accesso al DB.
    async fn authenticate(&self, session: Option<&str>) -> ServiceResult<String> {
        let token = session.map(str::trim).filter(|t| !t.is_empty()).ok_or(ServiceError::Unauthorized)?;
        auth::validate_session(self.db.clone(), token)
            .await?
            .ok_or(ServiceError::Unauthorized)
    }

    async fn dispatch(&self, msg: ClientMessage) -> ServiceResult<ServerMessage> {
        let db = self.db.clone();
        let response = match msg {
            ClientMessage::Register { username, password, email } => {
                let session = auth::register(db, &username, &password, email.as_deref(), &self.config).await?;
                ServerMessage::Registered { session }
            }
            ClientMessage::Login { username, password } => {
                let session = auth::login(db, &username, &password, &self.config).await?;
                ServerMessage::LoggedIn { session }
            }
            ClientMessage::Logout { session } => {
                self.authenticate(session.as_deref()).await?;
                auth::logout(db, session.as_deref().unwrap_or_default().trim()).await?;
                ServerMessage::LoggedOut
            }
            ClientMessage::CreateGroup { session, name, description } => {
                let uid = self.authenticate(session.as_deref()).await?;
                let group = groups::create_group(db, &self.config, &uid, &name, description.as_deref()).await?;
                ServerMessage::GroupCreated { group }
            }
            ClientMessage::JoinGroup { session, invite_code } => {
                let uid = self.authenticate(session.as_deref()).await?;
                let group = groups::join_group(db, &uid, &invite_code).await?;
                ServerMessage::GroupJoined { group, message: "Successfully joined group!".into() }
            }
            ClientMessage::LeaveGroup { session, group_id } => {
                let uid = self.authenticate(session.as_deref()).await?;
                let result = membership::leave_group(db, &uid, &group_id).await?;
                let message = match &result {
                    LeaveOutcome::GroupDeleted => "Successfully left group; the group was deleted",
                    LeaveOutcome::OwnershipTransferred { .. } => "Successfully left group; ownership transferred",
                    LeaveOutcome::Left => "Successfully left group",
                };
                ServerMessage::GroupLeft { result, message: message.into() }
            }
            ClientMessage::MyGroups { session } => {
                let uid = self.authenticate(session.as_deref()).await?;
                ServerMessage::GroupsList { groups: groups::my_groups(db, &uid).await? }
            }
            ClientMessage::GroupDetails { session, group_id } => {
                let uid = self.authenticate(session.as_deref()).await?;
                ServerMessage::Group { group: groups::group_details(db, &uid, &group_id).await? }
            }
            ClientMessage::CreateList { session, group_id, name, description } => {
                let uid = self.authenticate(session.as_deref()).await?;
                let list = shopping::create_list(db, &uid, &group_id, &name, description.as_deref()).await?;
                ServerMessage::ListCreated { list }
            }
            ClientMessage::GroupLists { session, group_id } => {
                let uid = self.authenticate(session.as_deref()).await?;
                ServerMessage::ListsList { lists: shopping::group_lists(db, &uid, &group_id).await? }
            }
            ClientMessage::GetList { session, list_id } => {
                let uid = self.authenticate(session.as_deref()).await?;
                ServerMessage::List { list: shopping::get_list(db, &uid, &list_id).await? }
            }
            ClientMessage::UpdateList { session, list_id, changes } => {
                let uid = self.authenticate(session.as_deref()).await?;
                ServerMessage::List { list: shopping::update_list(db, &uid, &list_id, &changes).await? }
            }
            ClientMessage::DeleteList { session, list_id } => {
                let uid = self.authenticate(session.as_deref()).await?;
                shopping::delete_list(db, &uid, &list_id).await?;
                ServerMessage::ListDeleted { message: "Shopping list deleted successfully".into() }
            }
            ClientMessage::RecentLists { session, limit } => {
                let uid = self.authenticate(session.as_deref()).await?;
                ServerMessage::RecentLists { lists: shopping::recent_lists(db, &uid, limit).await? }
            }
            ClientMessage::AddItem { session, list_id, item } => {
                let uid = self.authenticate(session.as_deref()).await?;
                ServerMessage::ItemCreated { item: shopping::add_item(db, &uid, &list_id, &item).await? }
            }
            ClientMessage::ListItems { session, list_id } => {
                let uid = self.authenticate(session.as_deref()).await?;
                ServerMessage::ItemsList { items: shopping::list_items(db, &uid, &list_id).await? }
            }
            ClientMessage::UpdateItem { session, item_id, changes } => {
                let uid = self.authenticate(session.as_deref()).await?;
                ServerMessage::Item { item: shopping::update_item(db, &uid, &item_id, &changes).await? }
            }
            ClientMessage::DeleteItem { session, item_id } => {
                let uid = self.authenticate(session.as_deref()).await?;
                shopping::delete_item(db, &uid, &item_id).await?;
                ServerMessage::ItemDeleted { message: "Shopping item deleted successfully".into() }
            }
        };
        Ok(response)
    }
}
