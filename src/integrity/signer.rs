use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::IntegrityError;
use crate::integrity::builder::ManifestBuilder;
use crate::integrity::canonical::canonical_manifest_bytes;
use crate::integrity::model::SignedDocument;
use crate::integrity::{APP_SIGNATURE_PATH, CORE_SIGNATURE_PATH};
use crate::sign::{self, SigningKey};

/// Which kind of tree is signed; fixes where the document is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureTarget {
    App,
    Core,
}

impl SignatureTarget {
    /// Location of the signature document relative to the signed root.
    pub fn document_path(&self) -> &'static str {
        match self {
            SignatureTarget::App => APP_SIGNATURE_PATH,
            SignatureTarget::Core => CORE_SIGNATURE_PATH,
        }
    }

    /// Directory that must already exist (and be writable) for signing.
    pub fn target_dir(&self, root: &Path) -> PathBuf {
        let document = root.join(self.document_path());
        match document.parent() {
            Some(dir) => dir.to_path_buf(),
            None => root.to_path_buf(),
        }
    }
}

/// Produces and persists signed manifests for one target kind.
#[derive(Debug, Clone)]
pub struct Signer {
    target: SignatureTarget,
    builder: ManifestBuilder,
}

impl Signer {
    pub fn new(target: SignatureTarget, builder: ManifestBuilder) -> Self {
        Signer { target, builder }
    }

    /// Build the manifest of `root` and sign its canonical encoding.
    ///
    /// Fails with [`IntegrityError::KeyMismatch`] before touching the tree
    /// if `key` is not the private half of `certificate_pem`.
    pub fn sign(
        &self,
        root: &Path,
        key: &SigningKey,
        certificate_pem: &str,
    ) -> Result<SignedDocument, IntegrityError> {
        let certificate = sign::parse_certificate(certificate_pem.as_bytes())?;
        key.ensure_matches(&certificate)?;

        let hashes = self.builder.build(root)?;
        let signature = key.sign(&canonical_manifest_bytes(&hashes)?)?;
        Ok(SignedDocument {
            hashes,
            signature,
            certificate: certificate_pem.to_string(),
        })
    }

    /// Write `document` below `root`, replacing any previous one.
    pub fn persist(&self, root: &Path, document: &SignedDocument) -> Result<PathBuf, IntegrityError> {
        let target_dir = self.target.target_dir(root);
        ensure_writable_dir(&target_dir)?;

        let path = root.join(self.target.document_path());
        let json = serde_json::to_string_pretty(document)?;
        fs::write(&path, json).map_err(|e| IntegrityError::NotWritable {
            path: target_dir,
            source: Some(e),
        })?;

        tracing::info!(
            path = %path.display(),
            files = document.hashes.len(),
            "signature document written"
        );
        Ok(path)
    }

    /// Check preconditions, sign `root` and persist the document.
    pub fn write_signature(
        &self,
        root: &Path,
        key: &SigningKey,
        certificate_pem: &str,
    ) -> Result<PathBuf, IntegrityError> {
        ensure_writable_dir(&self.target.target_dir(root))?;
        let document = self.sign(root, key, certificate_pem)?;
        self.persist(root, &document)
    }
}

fn ensure_writable_dir(dir: &Path) -> Result<(), IntegrityError> {
    let meta = match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => meta,
        Ok(_) => {
            return Err(IntegrityError::DirectoryNotFound {
                path: dir.to_path_buf(),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(IntegrityError::DirectoryNotFound {
                path: dir.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(IntegrityError::NotWritable {
                path: dir.to_path_buf(),
                source: Some(e),
            })
        }
    };
    if meta.permissions().readonly() {
        return Err(IntegrityError::NotWritable {
            path: dir.to_path_buf(),
            source: None,
        });
    }
    Ok(())
}
