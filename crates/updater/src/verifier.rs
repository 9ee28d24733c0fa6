use crate::cancel::CancelToken;
use crate::error::{Result, UpdateError};
use md5::{Digest, Md5};
use std::fs;
use std::io::Read;
use std::path::Path;
use tokio::task;

/// Compute the MD5 digest of `path` and compare it, case-insensitively,
/// against the manifest's expected hex digest. The hash runs on the
/// blocking pool so it never ties up the transfer loop or the caller's
/// thread, and it checks `cancel` between chunks so an in-flight
/// verification can be aborted.
pub async fn verify_file(path: &Path, expected_md5: &str, cancel: &CancelToken) -> Result<bool> {
    let digest = hash_file(path, cancel).await?;
    Ok(digest == expected_md5.to_ascii_lowercase())
}

/// MD5 of the full file contents, lowercase hex.
pub async fn hash_file(path: &Path, cancel: &CancelToken) -> Result<String> {
    let path = path.to_path_buf();
    let cancel = cancel.clone();

    task::spawn_blocking(move || {
        let mut file = fs::File::open(&path)?;
        let mut hasher = Md5::new();
        let mut buffer = [0u8; 64 * 1024];
        loop {
            if cancel.is_cancelled() {
                return Err(UpdateError::Cancelled);
            }
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|err| UpdateError::Other(format!("task join error: {err}")))?
}
