use std::path::{Path, PathBuf};

use crate::error::IntegrityError;
use crate::integrity::enumerate::FileEnumerator;
use crate::integrity::hasher::{ContentHasher, MutableFilePolicy};
use crate::integrity::model::FileManifest;

/// Enumerates and hashes a tree into a [`FileManifest`].
///
/// Signer and Verifier must build with the same enumerator and hasher for a
/// given scope, otherwise an unmodified tree will not verify.
#[derive(Debug, Clone, Default)]
pub struct ManifestBuilder {
    enumerator: FileEnumerator,
    hasher: ContentHasher,
}

impl ManifestBuilder {
    pub fn new(enumerator: FileEnumerator, hasher: ContentHasher) -> Self {
        ManifestBuilder { enumerator, hasher }
    }

    pub fn for_app(policy: MutableFilePolicy) -> Self {
        Self::new(FileEnumerator::for_app(), ContentHasher::new(policy))
    }

    pub fn for_core(root: &Path, extra_excluded_dirs: &[PathBuf], policy: MutableFilePolicy) -> Self {
        Self::new(
            FileEnumerator::for_core(root, extra_excluded_dirs),
            ContentHasher::new(policy),
        )
    }

    pub fn build(&self, root: &Path) -> Result<FileManifest, IntegrityError> {
        let mut manifest = FileManifest::new();
        for relative in self.enumerator.enumerate(root)? {
            let digest = self.hasher.hash(root, &relative)?;
            manifest.insert(relative, digest);
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash;
    use crate::integrity::hasher::HTACCESS_MARKER;
    use std::fs;

    #[test]
    fn manifest_covers_every_enumerated_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("subfolder")).unwrap();
        fs::create_dir_all(dir.path().join("appinfo")).unwrap();
        fs::write(dir.path().join("AnotherFile.txt"), "another").unwrap();
        fs::write(dir.path().join("subfolder/file.txt"), "file").unwrap();
        fs::write(dir.path().join("appinfo/signature.json"), "{}").unwrap();

        let manifest = ManifestBuilder::for_app(MutableFilePolicy::none())
            .build(dir.path())
            .unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(
            manifest.get("AnotherFile.txt"),
            Some(hash::sha512_hex(b"another").as_str())
        );
        assert_eq!(
            manifest.get("subfolder/file.txt"),
            Some(hash::sha512_hex(b"file").as_str())
        );
    }

    #[test]
    fn core_builder_applies_mutable_file_policy() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".htaccess"),
            format!("rules\n{HTACCESS_MARKER}\nlocal additions\n"),
        )
        .unwrap();
        let manifest = ManifestBuilder::for_core(dir.path(), &[], MutableFilePolicy::core())
            .build(dir.path())
            .unwrap();
        assert_eq!(
            manifest.get(".htaccess"),
            Some(hash::sha512_hex(b"rules\n").as_str())
        );
    }

    #[test]
    fn empty_tree_builds_empty_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ManifestBuilder::default().build(dir.path()).unwrap();
        assert!(manifest.is_empty());
    }
}
