use async_trait::async_trait;
use dashmap::DashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Byte sink for uploaded playlists and segments
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist `bytes` under `channel_id/relative_path`, replacing any
    /// previous upload at the same path.
    async fn write(&self, channel_id: &str, relative_path: &str, bytes: &[u8]) -> io::Result<()>;
}

/// Reject paths that are empty, absolute, or climb out of the channel
/// directory. Returns the normalized relative path.
pub fn sanitize_relative_path(path: &str) -> Option<String> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    let mut parts = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Writes uploads to `root/<channel>/<path>`
#[derive(Clone, Debug)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn target(&self, channel_id: &str, relative_path: &str) -> io::Result<PathBuf> {
        let channel = sanitize_relative_path(channel_id)
            .filter(|c| !c.contains('/'))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid channel id"))?;
        let relative = sanitize_relative_path(relative_path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid upload path"))?;
        Ok(self.root.join(channel).join(relative))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn write(&self, channel_id: &str, relative_path: &str, bytes: &[u8]) -> io::Result<()> {
        let target = self.target(channel_id, relative_path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        debug!("Wrote {} bytes to {}", bytes.len(), target.display());
        Ok(())
    }
}

/// Keeps uploads in memory, keyed by `channel/path`
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    objects: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel_id: &str, relative_path: &str) -> Option<Vec<u8>> {
        self.objects
            .get(&format!("{}/{}", channel_id, relative_path))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn write(&self, channel_id: &str, relative_path: &str, bytes: &[u8]) -> io::Result<()> {
        self.objects
            .insert(format!("{}/{}", channel_id, relative_path), bytes.to_vec());
        Ok(())
    }
}
