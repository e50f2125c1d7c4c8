use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use listing::FileStore;
use tracing::debug;

/// [`FileStore`] writing under a local upload root.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn ensure_single_component(kind: &str, raw: &str) -> Result<()> {
    let mut components = Path::new(raw).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !raw.contains(['/', '\\']) => Ok(()),
        _ => bail!("invalid {kind} name '{raw}'"),
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store_as(&self, folder: &str, name: &str, bytes: &[u8]) -> Result<String> {
        ensure_single_component("folder", folder)?;
        ensure_single_component("file", name)?;

        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create upload folder '{}'", dir.display()))?;

        let path = dir.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write upload '{}'", path.display()))?;
        debug!(path = %path.display(), size = bytes.len(), "stored upload");

        Ok(format!("{folder}/{name}"))
    }
}
