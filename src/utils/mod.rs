pub mod logger;
#[cfg(feature = "server")]
pub mod performance;
