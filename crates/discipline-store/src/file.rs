//! File-backed store

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{Codec, StoreError, StoreResult, ValueStore};

/// Keeps one value as a text file.
///
/// Writes go to a sibling `.tmp` file that is then renamed over the target,
/// so a crash mid-write leaves the previous value in place.
pub struct FileStore<V> {
    path: PathBuf,
    codec: Codec<V>,
}

impl<V> FileStore<V> {
    pub fn new(path: impl Into<PathBuf>, codec: Codec<V>) -> Self {
        Self {
            path: path.into(),
            codec,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + use<> {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

#[async_trait]
impl<V: Send + Sync + 'static> ValueStore<V> for FileStore<V> {
    async fn read(&self) -> StoreResult<V> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => self
                .codec
                .deserialize(&text)
                .map_err(|source| StoreError::Deserialize {
                    location: self.path.display().to_string(),
                    source,
                }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No stored value, writing fallback");
                let value = self.codec.fallback();
                self.write(&value).await?;
                Ok(value)
            }
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn write(&self, value: &V) -> StoreResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }

        let text = self.codec.serialize(value);
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, text)
            .await
            .map_err(io_error(&temp_path))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(io_error(&self.path))?;

        debug!(path = %self.path.display(), "Value written");
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                !parent.exists() || parent.is_dir()
            }
            _ => true,
        }
    }
}
