use crate::error::IndexError;
use crate::index::VectorIndex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

const CURRENT_DIR: &str = "current";
const PREVIOUS_DIR: &str = "previous";
const STAGING_PREFIX: &str = ".staging-";

/// The single persisted index version at a known location.
///
/// `publish` never leaves a half-written index under `current`: the new
/// version is written and verified in a staging directory, then swapped in
/// by rename. The old version stays in `previous` until the swap succeeds.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current_dir(&self) -> PathBuf {
        self.root.join(CURRENT_DIR)
    }

    /// `Ok(None)` when nothing has been published yet.
    pub fn load(&self) -> Result<Option<VectorIndex>, IndexError> {
        let current = self.current_dir();
        if !current.exists() {
            let previous = self.root.join(PREVIOUS_DIR);
            if !previous.exists() {
                return Ok(None);
            }
            warn!(
                path = %previous.display(),
                "restoring previous index left behind by an interrupted publish"
            );
            fs::rename(&previous, &current)?;
        }

        VectorIndex::load(&current).map(Some)
    }

    pub fn publish(&self, index: &VectorIndex) -> Result<PathBuf, IndexError> {
        fs::create_dir_all(&self.root)?;
        self.discard_staging();

        let staging = self
            .root
            .join(format!("{STAGING_PREFIX}{}", Uuid::new_v4()));
        if let Err(error) = stage(index, &staging) {
            remove_quietly(&staging);
            return Err(error);
        }

        let current = self.current_dir();
        let previous = self.root.join(PREVIOUS_DIR);
        if previous.exists() {
            fs::remove_dir_all(&previous)?;
        }
        if current.exists() {
            fs::rename(&current, &previous)?;
        }
        fs::rename(&staging, &current)?;
        remove_quietly(&previous);

        info!(
            path = %current.display(),
            chunks = index.len(),
            checksum = %index.manifest().document.checksum,
            "published index"
        );
        Ok(current)
    }

    fn discard_staging(&self) {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return;
        };
        for entry in entries.filter_map(|entry| entry.ok()) {
            let is_staging = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(STAGING_PREFIX));
            if is_staging {
                remove_quietly(&entry.path());
            }
        }
    }
}

fn stage(index: &VectorIndex, staging: &Path) -> Result<(), IndexError> {
    index.persist(staging)?;

    let verified = VectorIndex::load(staging)?;
    if verified.len() != index.len() || verified.manifest() != index.manifest() {
        return Err(IndexError::Invalid(
            "staged index does not match the index that was built".to_string(),
        ));
    }
    Ok(())
}

fn remove_quietly(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(error) = fs::remove_dir_all(path) {
        warn!(path = %path.display(), %error, "failed to remove index directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tiny_index;
    use tempfile::tempdir;

    fn entries(root: &Path) -> Vec<String> {
        let mut names = fs::read_dir(root)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    #[test]
    fn nothing_published_loads_none() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("vector_db"));
        assert!(store.load()?.is_none());
        Ok(())
    }

    #[test]
    fn publish_replaces_the_active_version() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path());

        store.publish(&tiny_index("first"))?;
        store.publish(&tiny_index("second"))?;

        let loaded = store.load()?.expect("index should be published");
        assert_eq!(loaded.manifest().document.checksum, "second");
        assert_eq!(entries(dir.path()), vec!["current".to_string()]);
        Ok(())
    }

    #[test]
    fn interrupted_publish_restores_previous() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path());
        store.publish(&tiny_index("first"))?;

        // crash between moving current aside and renaming staging into place
        fs::rename(store.current_dir(), dir.path().join(PREVIOUS_DIR))?;
        fs::create_dir(dir.path().join(".staging-abandoned"))?;

        let loaded = store.load()?.expect("previous index should be restored");
        assert_eq!(loaded.manifest().document.checksum, "first");

        store.publish(&tiny_index("second"))?;
        assert_eq!(entries(dir.path()), vec!["current".to_string()]);
        Ok(())
    }

    #[test]
    fn corrupt_active_index_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path());
        store.publish(&tiny_index("first"))?;
        fs::write(store.current_dir().join(crate::index::METADATA_FILE), b"{")?;

        assert!(matches!(store.load(), Err(IndexError::Corrupt(_))));
        Ok(())
    }
}
