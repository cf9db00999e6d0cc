//! Secret values and secret-file loading.
//!
//! Re-exports the [`secrecy`] types so that secrets are redacted in `Debug`
//! output and zeroized on drop, and adds helpers for reading a secret that a
//! sibling process writes to disk (for example the cookie key RStudio Server
//! generates on first start).
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! let key = SecretString::from("cookie-key");
//! assert!(format!("{key:?}").contains("REDACTED"));
//! assert_eq!(key.expose_secret(), "cookie-key");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Errors returned while loading a secret from disk.
#[derive(Debug, Error)]
pub enum SecretFileError {
    /// The file never appeared within the allowed wait.
    #[error("secret file {path} did not appear within {waited:?}")]
    NotFound { path: PathBuf, waited: Duration },

    /// The file exists but could not be read.
    #[error("failed to read secret file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is empty.
    #[error("secret file {0} is empty")]
    Empty(PathBuf),
}

/// Read a secret from `path`.
///
/// The contents are used verbatim, trailing newline included: the process
/// that wrote the file keys its own HMAC on the raw bytes, so any trimming
/// would produce signatures it rejects.
///
/// # Errors
///
/// Returns `SecretFileError::Io` if the file cannot be read and
/// `SecretFileError::Empty` if it holds nothing.
pub async fn read_secret_file(path: &Path) -> Result<SecretString, SecretFileError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SecretFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    if contents.is_empty() {
        return Err(SecretFileError::Empty(path.to_path_buf()));
    }

    Ok(SecretString::from(contents))
}

/// Wait until `path` exists, then read it as a secret.
///
/// Polls every `poll_interval` and gives up after `timeout`.
///
/// # Errors
///
/// Returns `SecretFileError::NotFound` when the file does not appear in time,
/// otherwise the errors of [`read_secret_file`].
pub async fn wait_for_secret_file(
    path: &Path,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<SecretString, SecretFileError> {
    let started = Instant::now();

    loop {
        match tokio::fs::try_exists(path).await {
            Ok(true) => return read_secret_file(path).await,
            Ok(false) => {}
            Err(e) => {
                tracing::debug!(target: "common.secret", error = %e, "Secret file existence check failed");
            }
        }

        if started.elapsed() >= timeout {
            return Err(SecretFileError::NotFound {
                path: path.to_path_buf(),
                waited: started.elapsed(),
            });
        }

        tracing::debug!(
            target: "common.secret",
            path = %path.display(),
            "Waiting for secret file"
        );
        tokio::time::sleep(poll_interval).await;
    }
}
