use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal failures of signing or verification.
///
/// Content drift (changed, missing or extra files) is never an error; it is
/// reported through [`crate::integrity::model::Violations`]. Messages name the
/// offending path or scope and never include key material.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("Signature data not found.")]
    SignatureDataNotFound { path: PathBuf },

    #[error("Signature data is malformed: {detail}")]
    SignatureDataMalformed { path: PathBuf, detail: String },

    #[error("Signature could not get verified.")]
    SignatureInvalid,

    #[error("Certificate is not valid. {reason}")]
    CertificateInvalid { reason: String },

    #[error("Certificate is not valid for required scope. (Requested: {requested}, current: CN={current})")]
    CertificateScopeMismatch { requested: String, current: String },

    #[error("{} does not exist", path.display())]
    DirectoryNotFound { path: PathBuf },

    #[error("{} is not writable", path.display())]
    NotWritable {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("{} is not readable", path.display())]
    NotReadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} has a name that is not valid UTF-8", path.display())]
    NonUtf8Path { path: PathBuf },

    #[error("Certificate public key does not match the private key")]
    KeyMismatch,

    #[error("App {0} could not be found")]
    AppNotFound(String),

    #[error("Cryptographic operation failed: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    #[error("Could not encode signature data: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Coarse classification of an [`IntegrityError`], stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FatalKind {
    SignatureDataNotFound,
    SignatureInvalid,
    CertificateInvalid,
    CertificateScopeMismatch,
    DirectoryNotFound,
    NotWritable,
    NotReadable,
    KeyMismatch,
    AppNotFound,
    Crypto,
}

impl FatalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FatalKind::SignatureDataNotFound => "SignatureDataNotFound",
            FatalKind::SignatureInvalid => "SignatureInvalid",
            FatalKind::CertificateInvalid => "CertificateInvalid",
            FatalKind::CertificateScopeMismatch => "CertificateScopeMismatch",
            FatalKind::DirectoryNotFound => "DirectoryNotFound",
            FatalKind::NotWritable => "NotWritable",
            FatalKind::NotReadable => "NotReadable",
            FatalKind::KeyMismatch => "KeyMismatch",
            FatalKind::AppNotFound => "AppNotFound",
            FatalKind::Crypto => "Crypto",
        }
    }
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IntegrityError {
    pub fn kind(&self) -> FatalKind {
        match self {
            Self::SignatureDataNotFound { .. } | Self::SignatureDataMalformed { .. } => {
                FatalKind::SignatureDataNotFound
            }
            Self::SignatureInvalid => FatalKind::SignatureInvalid,
            Self::CertificateInvalid { .. } => FatalKind::CertificateInvalid,
            Self::CertificateScopeMismatch { .. } => FatalKind::CertificateScopeMismatch,
            Self::DirectoryNotFound { .. } => FatalKind::DirectoryNotFound,
            Self::NotWritable { .. } => FatalKind::NotWritable,
            Self::NotReadable { .. } | Self::NonUtf8Path { .. } => FatalKind::NotReadable,
            Self::KeyMismatch => FatalKind::KeyMismatch,
            Self::AppNotFound(_) => FatalKind::AppNotFound,
            Self::Crypto(_) | Self::Encoding(_) => FatalKind::Crypto,
        }
    }

    pub(crate) fn not_readable(path: &Path, source: std::io::Error) -> Self {
        Self::NotReadable {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn certificate_invalid(reason: impl Into<String>) -> Self {
        Self::CertificateInvalid {
            reason: reason.into(),
        }
    }
}
