//! Local directory backend: one `<key>.json` file per key.
//!
//! Writes go to a sibling temp file first and are renamed into place, so a
//! crash mid-write leaves the previous blob intact.

use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::PersistenceStore;

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub async fn open(root: &Path) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("creating state directory {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            bail!("invalid store key {key:?}");
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

#[async_trait]
impl PersistenceStore for FileStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    async fn set(&self, key: &str, blob: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, blob)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("renaming into {}", path.display()))?;
        Ok(())
    }
}
