//! Container identity binding.
//!
//! A container serves exactly one subject. The first subject to authenticate
//! successfully is recorded durably; from then on every other subject is
//! refused with `ContainerIdentityMismatch`, including after a restart.
//!
//! The record lives behind [`BindingStore`] so deployments can pre-seed the
//! binding ([`StaticBindingStore`]) instead of learning it on first use
//! ([`FileBindingStore`]).

use crate::auth::failure::AuthFailure;
use crate::observability::metrics;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::instrument;

/// Errors raised by a binding store.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("binding record {path} could not be accessed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("binding record {0} is empty")]
    Empty(PathBuf),
}

/// Durable storage for the bound subject.
#[async_trait]
pub trait BindingStore: Send + Sync {
    /// Read the bound subject, if one has been recorded.
    async fn load(&self) -> Result<Option<String>, BindingError>;

    /// Record `subject` unless a subject is already recorded.
    ///
    /// Returns the subject that ends up bound: `subject` if this call won,
    /// otherwise the previously recorded one. Must be atomic across
    /// concurrent callers and processes.
    async fn create_if_absent(&self, subject: &str) -> Result<String, BindingError>;
}

/// Binding record kept in a single file.
///
/// The file holds the subject and nothing else. It is created with
/// write-to-temp, fsync, then `link(2)`, so it either does not exist or holds
/// a complete subject, and only one creator can win.
#[derive(Debug, Clone)]
pub struct FileBindingStore {
    path: PathBuf,
}

impl FileBindingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> BindingError {
        BindingError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn parent_dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    async fn write_temp(&self, subject: &str) -> Result<PathBuf, BindingError> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "binding".to_string());
        let temp_path = self
            .parent_dir()
            .join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(subject.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.sync_all().await.map_err(|e| self.io_error(e))?;

        Ok(temp_path)
    }

    async fn sync_parent_dir(&self) {
        #[cfg(unix)]
        {
            let synced = match tokio::fs::File::open(self.parent_dir()).await {
                Ok(dir) => dir.sync_all().await,
                Err(e) => Err(e),
            };
            if let Err(e) = synced {
                tracing::warn!(target: "edge.auth.binding", error = %e, "Failed to fsync binding directory");
            }
        }
    }
}

async fn remove_temp(temp_path: &Path) {
    if let Err(e) = tokio::fs::remove_file(temp_path).await {
        tracing::warn!(
            target: "edge.auth.binding",
            path = %temp_path.display(),
            error = %e,
            "Failed to remove temporary binding file"
        );
    }
}

#[async_trait]
impl BindingStore for FileBindingStore {
    async fn load(&self) -> Result<Option<String>, BindingError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        // Hand-seeded files usually end with a newline
        let subject = contents.trim_end_matches(['\n', '\r']);
        if subject.is_empty() {
            return Err(BindingError::Empty(self.path.clone()));
        }
        Ok(Some(subject.to_string()))
    }

    async fn create_if_absent(&self, subject: &str) -> Result<String, BindingError> {
        let temp_path = self.write_temp(subject).await?;

        match tokio::fs::hard_link(&temp_path, &self.path).await {
            Ok(()) => {
                remove_temp(&temp_path).await;
                self.sync_parent_dir().await;
                Ok(subject.to_string())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                remove_temp(&temp_path).await;
                self.load()
                    .await?
                    .ok_or_else(|| self.io_error(std::io::Error::from(ErrorKind::NotFound)))
            }
            Err(e) => {
                remove_temp(&temp_path).await;
                Err(self.io_error(e))
            }
        }
    }
}

/// Binding fixed at deployment time.
#[derive(Debug, Clone)]
pub struct StaticBindingStore {
    subject: String,
}

impl StaticBindingStore {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl BindingStore for StaticBindingStore {
    async fn load(&self) -> Result<Option<String>, BindingError> {
        Ok(Some(self.subject.clone()))
    }

    async fn create_if_absent(&self, _subject: &str) -> Result<String, BindingError> {
        Ok(self.subject.clone())
    }
}

/// Binds the container to its first authenticated subject.
///
/// The bound subject is memoised in memory once known; the store is only
/// consulted until then.
pub struct IdentityBinder {
    store: Box<dyn BindingStore>,
    bound: RwLock<Option<String>>,
}

impl IdentityBinder {
    pub fn new(store: impl BindingStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            bound: RwLock::new(None),
        }
    }

    /// Subject this container is bound to, if any.
    ///
    /// # Errors
    ///
    /// Returns `AuthFailure::ContainerIdentityMismatch` when the store cannot
    /// be read; an unreadable binding is treated as a binding to nobody.
    pub async fn bound_subject(&self) -> Result<Option<String>, AuthFailure> {
        if let Some(bound) = self.bound.read().await.as_ref() {
            return Ok(Some(bound.clone()));
        }

        let loaded = self.store.load().await.map_err(|e| {
            tracing::error!(target: "edge.auth.binding", error = %e, "Failed to read identity binding");
            metrics::record_identity_binding("error");
            AuthFailure::ContainerIdentityMismatch
        })?;

        if let Some(subject) = &loaded {
            *self.bound.write().await = Some(subject.clone());
        }
        Ok(loaded)
    }

    /// Bind to `subject` if unbound, then check `subject` is the bound one.
    ///
    /// # Errors
    ///
    /// Returns `AuthFailure::ContainerIdentityMismatch` if the container is
    /// bound to a different subject, the binding cannot be read or written,
    /// or `subject` is empty or spans lines.
    #[instrument(skip_all)]
    pub async fn bind_and_check(&self, subject: &str) -> Result<(), AuthFailure> {
        // Must round-trip through the record, which trims line endings
        if subject.is_empty() || subject.contains(['\n', '\r']) {
            tracing::error!(target: "edge.auth.binding", "Refusing to bind a subject that cannot be recorded");
            metrics::record_identity_binding("error");
            return Err(AuthFailure::ContainerIdentityMismatch);
        }

        let bound = match self.bound_subject().await? {
            Some(bound) => bound,
            None => {
                let winner = self.store.create_if_absent(subject).await.map_err(|e| {
                    tracing::error!(target: "edge.auth.binding", error = %e, "Failed to record identity binding");
                    metrics::record_identity_binding("error");
                    AuthFailure::ContainerIdentityMismatch
                })?;
                *self.bound.write().await = Some(winner.clone());
                if winner == subject {
                    tracing::info!(target: "edge.auth.binding", "Container bound to first authenticated subject");
                    metrics::record_identity_binding("bound");
                    return Ok(());
                }
                winner
            }
        };

        if bound == subject {
            metrics::record_identity_binding("match");
            Ok(())
        } else {
            tracing::error!(target: "edge.auth.binding", "Subject does not match container binding");
            metrics::record_identity_binding("mismatch");
            Err(AuthFailure::ContainerIdentityMismatch)
        }
    }
}
