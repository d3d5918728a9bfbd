use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::error::{FatalKind, IntegrityError};

// ── Manifest ────────────────────────────────────────────────────────────────

/// Relative path (forward slashes) → hex SHA-512 digest, ordered by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FileManifest(BTreeMap<String, String>);

impl FileManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, digest: impl Into<String>) {
        self.0.insert(path.into(), digest.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in canonical (byte-wise ascending path) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(p, d)| (p.as_str(), d.as_str()))
    }
}

impl FromIterator<(String, String)> for FileManifest {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        FileManifest(iter.into_iter().collect())
    }
}

/// On-disk shapes accepted for `hashes`: the path → digest object, or the
/// entry list written by newer signers.
#[derive(Deserialize)]
#[serde(untagged)]
enum HashesRepr {
    Map(BTreeMap<String, String>),
    Entries(Vec<HashEntry>),
}

#[derive(Deserialize)]
struct HashEntry {
    file: String,
    hash: String,
}

impl<'de> Deserialize<'de> for FileManifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match HashesRepr::deserialize(deserializer)? {
            HashesRepr::Map(map) => FileManifest(map),
            HashesRepr::Entries(entries) => entries.into_iter().map(|e| (e.file, e.hash)).collect(),
        })
    }
}

// ── Signed document ─────────────────────────────────────────────────────────

/// Contents of `appinfo/signature.json` / `core/signature.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedDocument {
    pub hashes: FileManifest,
    /// Base64 RSA-PSS signature over the canonical encoding of `hashes`.
    pub signature: String,
    /// PEM-encoded signing certificate.
    pub certificate: String,
}

// ── Verification outcome ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashMismatch {
    pub expected: String,
    pub current: String,
}

/// Content drift between a trusted manifest and the live tree.
///
/// The three maps are disjoint: a path appears in at most one of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violations {
    #[serde(
        rename = "INVALID_HASH",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub invalid_hash: BTreeMap<String, HashMismatch>,
    #[serde(
        rename = "FILE_MISSING",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub missing: BTreeMap<String, HashMismatch>,
    #[serde(
        rename = "EXTRA_FILE",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub extra: BTreeMap<String, HashMismatch>,
}

impl Violations {
    pub fn is_empty(&self) -> bool {
        self.invalid_hash.is_empty() && self.missing.is_empty() && self.extra.is_empty()
    }

    pub fn len(&self) -> usize {
        self.invalid_hash.len() + self.missing.len() + self.extra.len()
    }
}

/// A trust or setup failure that invalidated the whole check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fatal {
    #[serde(rename = "class")]
    pub kind: FatalKind,
    pub message: String,
}

impl From<&IntegrityError> for Fatal {
    fn from(err: &IntegrityError) -> Self {
        Fatal {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result of one verification: exactly one of clean, drift, or fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "OutcomeRecord", from = "OutcomeRecord")]
pub enum VerificationOutcome {
    Clean,
    Violations(Violations),
    Fatal(Fatal),
}

impl VerificationOutcome {
    pub fn from_violations(violations: Violations) -> Self {
        if violations.is_empty() {
            VerificationOutcome::Clean
        } else {
            VerificationOutcome::Violations(violations)
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, VerificationOutcome::Clean)
    }

    pub fn violations(&self) -> Option<&Violations> {
        match self {
            VerificationOutcome::Violations(v) => Some(v),
            _ => None,
        }
    }

    pub fn fatal(&self) -> Option<&Fatal> {
        match self {
            VerificationOutcome::Fatal(f) => Some(f),
            _ => None,
        }
    }
}

impl From<Result<Violations, IntegrityError>> for VerificationOutcome {
    fn from(result: Result<Violations, IntegrityError>) -> Self {
        match result {
            Ok(violations) => VerificationOutcome::from_violations(violations),
            Err(err) => VerificationOutcome::Fatal(Fatal::from(&err)),
        }
    }
}

/// Serialized form of an outcome as stored in the result cache: `{}` when
/// clean, drift maps keyed `INVALID_HASH`/`FILE_MISSING`/`EXTRA_FILE`, or an
/// `EXCEPTION` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    #[serde(flatten)]
    pub violations: Violations,
    #[serde(rename = "EXCEPTION", default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<Fatal>,
}

impl From<VerificationOutcome> for OutcomeRecord {
    fn from(outcome: VerificationOutcome) -> Self {
        match outcome {
            VerificationOutcome::Clean => OutcomeRecord::default(),
            VerificationOutcome::Violations(violations) => OutcomeRecord {
                violations,
                exception: None,
            },
            VerificationOutcome::Fatal(fatal) => OutcomeRecord {
                violations: Violations::default(),
                exception: Some(fatal),
            },
        }
    }
}

impl From<OutcomeRecord> for VerificationOutcome {
    fn from(record: OutcomeRecord) -> Self {
        match record.exception {
            Some(fatal) => VerificationOutcome::Fatal(fatal),
            None => VerificationOutcome::from_violations(record.violations),
        }
    }
}
