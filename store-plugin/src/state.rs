use crate::config::AppConfig;
use crate::error::AppError;
use snapshot_agent::storage::LocalStoreClient;

pub struct AppState {
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Directory-backed client for `bucket`, or the default bucket.
    pub fn store(&self, bucket: Option<&str>) -> Result<LocalStoreClient, AppError> {
        let bucket = bucket.unwrap_or(&self.config.bucket);
        if bucket.is_empty() || bucket.contains('/') || bucket == "." || bucket == ".." {
            return Err(AppError::BadRequest(format!("invalid bucket name: {bucket:?}")));
        }
        Ok(LocalStoreClient::new(&self.config.data_dir, bucket))
    }
}
