use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Root directory; every bucket is a subdirectory.
    pub data_dir: PathBuf,
    /// Bucket used when a request names none.
    pub bucket: String,
    /// Bearer token required on object routes when set.
    pub token: Option<String>,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            data_dir: PathBuf::from(
                std::env::var("DATA_DIR").unwrap_or_else(|_| "/var/lib/store-plugin".into()),
            ),
            bucket: std::env::var("BUCKET").unwrap_or_else(|_| "snapshots".into()),
            token: std::env::var("PLUGIN_TOKEN").ok().filter(|t| !t.is_empty()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        }
    }
}
