//! Persisted descriptors
//!
//! Each created domain leaves `<run_dir>/<uuid>.xml` behind, so that after a
//! restart a running unit can be matched back to its descriptor.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct DescriptorCache {
    dir: PathBuf,
}

impl DescriptorCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, uuid: &str) -> PathBuf {
        self.dir.join(format!("{}.xml", uuid))
    }

    pub fn save(&self, uuid: &str, xml: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path(uuid);
        std::fs::write(&path, xml)?;
        log::debug!("Saved descriptor {}", path.display());
        Ok(())
    }

    pub fn read(&self, uuid: &str) -> Result<String> {
        let path = self.path(uuid);
        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(format!("no cached descriptor for {}", uuid)),
            _ => e.into(),
        })
    }

    /// Remove the cached copy; a missing file is only worth a warning
    pub fn clear(&self, uuid: &str) {
        let path = self.path(uuid);
        match std::fs::remove_file(&path) {
            Ok(()) => log::debug!("Removed descriptor {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("Descriptor {} already removed", path.display());
            }
            Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_read_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DescriptorCache::new(dir.path().join("run"));

        cache.save("abc", "<domain/>").unwrap();
        assert_eq!(cache.path("abc"), dir.path().join("run/abc.xml"));
        assert_eq!(cache.read("abc").unwrap(), "<domain/>");

        cache.clear("abc");
        assert!(matches!(cache.read("abc"), Err(Error::NotFound(_))));
        // Clearing twice is tolerated
        cache.clear("abc");
    }
}
