//! `tar` + `zstd` archives of scratch directories.
//!
//! Synchronous; callers run these on the blocking pool.

use std::fs::File;
use std::path::Path;

use crate::utils::{AgentError, Result};

const ZSTD_LEVEL: i32 = 3;

/// Pack the contents of `src` (not `src` itself) into `dest`.
pub fn pack_dir(src: &Path, dest: &Path) -> Result<()> {
    let encoder = zstd::stream::write::Encoder::new(File::create(dest)?, ZSTD_LEVEL)?;
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(".", src)?;
    builder.into_inner()?.finish()?;
    Ok(())
}

/// Pack a single file into `dest` as the entry `name`.
pub fn pack_file(src: &Path, name: &str, dest: &Path) -> Result<()> {
    let encoder = zstd::stream::write::Encoder::new(File::create(dest)?, ZSTD_LEVEL)?;
    let mut builder = tar::Builder::new(encoder);
    builder.append_path_with_name(src, name)?;
    builder.into_inner()?.finish()?;
    Ok(())
}

/// Unpack `src` into `dest`, creating it if needed.
pub fn unpack(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let decoder = zstd::stream::read::Decoder::new(File::open(src)?)?;
    tar::Archive::new(decoder)
        .unpack(dest)
        .map_err(|e| AgentError::Transfer(format!("corrupt archive {}: {e}", src.display())))
}

/// Run blocking archive work off the async executor.
pub async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AgentError::Transfer(format!("archive task failed: {e}")))?
}
