use chrono::Utc;
use log::info;
use std::io::Write;

/// Inizializza env_logger con timestamp e posizione nel sorgente.
/// Il livello viene da `level` se presente, altrimenti da RUST_LOG.
pub fn init(level: Option<&str>) {
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}:{}] {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();

    info!("Logger initialized");
}
