use std::env;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub enable_tls: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub log_level: String,
    pub session_expiry_days: u32,
    pub argon2_salt_length: u32,
    pub max_request_length: usize,
    pub invite_code_bytes: usize,
    pub performance_log_path: Option<String>,
    pub stats_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            database_url: "sqlite:data/spesa.db".to_string(),
            enable_tls: false,
            tls_cert_path: None,
            tls_key_path: None,
            log_level: "info".to_string(),
            session_expiry_days: 7,
            argon2_salt_length: 16,
            max_request_length: 16 * 1024,
            invite_code_bytes: 9,
            performance_log_path: None,
            stats_interval_secs: 120,
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl ServerConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let d = Self::default();
        Self {
            host: env::var("SERVER_HOST").unwrap_or(d.host),
            port: parsed("SERVER_PORT", d.port),
            database_url: env::var("DATABASE_URL").unwrap_or(d.database_url),
            enable_tls: env::var("ENABLE_TLS").map(|v| v == "true" || v == "1").unwrap_or(d.enable_tls),
            tls_cert_path: env::var("TLS_CERT_PATH").ok(),
            tls_key_path: env::var("TLS_KEY_PATH").ok(),
            log_level: env::var("LOG_LEVEL").unwrap_or(d.log_level),
            session_expiry_days: parsed("SESSION_EXPIRY_DAYS", d.session_expiry_days),
            argon2_salt_length: parsed("ARGON2_SALT_LENGTH", d.argon2_salt_length),
            max_request_length: parsed("MAX_REQUEST_LENGTH", d.max_request_length),
            // below 6 bytes the codes become guessable
            invite_code_bytes: parsed("INVITE_CODE_BYTES", d.invite_code_bytes).max(6),
            performance_log_path: env::var("PERFORMANCE_LOG_PATH").ok(),
            stats_interval_secs: parsed("STATS_INTERVAL_SECS", d.stats_interval_secs).max(1),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub default_host: String,
    pub default_port: u16,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            default_host: env::var("CLIENT_DEFAULT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            default_port: parsed("CLIENT_DEFAULT_PORT", 5000),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.default_host, self.default_port)
    }
}
