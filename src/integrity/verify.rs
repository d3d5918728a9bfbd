// verify.rs — Verify a live tree against its signature document
//
// Stages run strictly in order and the first failure is fatal:
//
//   1. LoadSignature     read + parse the signature document
//   2. ValidateTrust     certificate chains to the pinned root, CN fits scope
//   3. ValidateSignature RSA-PSS over canonical_manifest_bytes(hashes)
//   4. Diff              rebuild the live manifest and compare
//
// Only a document that passed 2 and 3 is ever compared against the tree, so
// drift is never reported for an untrusted manifest.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::IntegrityError;
use crate::integrity::builder::ManifestBuilder;
use crate::integrity::canonical::canonical_manifest_bytes;
use crate::integrity::model::{FileManifest, HashMismatch, SignedDocument, VerificationOutcome, Violations};
use crate::integrity::trust::{TrustContext, TrustValidator};
use crate::sign;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadSignature,
    ValidateTrust,
    ValidateSignature,
    Diff,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::LoadSignature => "load-signature",
            Stage::ValidateTrust => "validate-trust",
            Stage::ValidateSignature => "validate-signature",
            Stage::Diff => "diff",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Verifier {
    builder: ManifestBuilder,
    check_validity_period: bool,
}

impl Verifier {
    pub fn new(builder: ManifestBuilder) -> Self {
        Verifier {
            builder,
            check_validity_period: true,
        }
    }

    /// Do not reject signing certificates outside their validity window.
    pub fn ignore_validity_period(mut self) -> Self {
        self.check_validity_period = false;
        self
    }

    /// Verify the tree at `base_path` against the document at `document_path`.
    pub fn verify(&self, document_path: &Path, base_path: &Path, trust: &TrustContext) -> VerificationOutcome {
        let result = load_document(document_path)
            .map_err(|e| (Stage::LoadSignature, e))
            .and_then(|document| self.check(&document, base_path, trust));
        outcome(&trust.requested_scope, result)
    }

    /// Verify an already loaded document.
    pub fn verify_document(
        &self,
        document: &SignedDocument,
        base_path: &Path,
        trust: &TrustContext,
    ) -> VerificationOutcome {
        outcome(&trust.requested_scope, self.check(document, base_path, trust))
    }

    fn check(
        &self,
        document: &SignedDocument,
        base_path: &Path,
        trust: &TrustContext,
    ) -> Result<Violations, (Stage, IntegrityError)> {
        let certificate = self
            .validate_trust(document, trust)
            .map_err(|e| (Stage::ValidateTrust, e))?;

        let signed = canonical_manifest_bytes(&document.hashes)
            .map_err(|e| (Stage::ValidateSignature, IntegrityError::from(e)))?;
        let public = certificate
            .public_key()
            .map_err(|e| (Stage::ValidateSignature, IntegrityError::from(e)))?;
        if !sign::verify(&*public, &signed, &document.signature) {
            return Err((Stage::ValidateSignature, IntegrityError::SignatureInvalid));
        }

        let current = self.builder.build(base_path).map_err(|e| (Stage::Diff, e))?;
        Ok(diff(&document.hashes, &current))
    }

    fn validate_trust(
        &self,
        document: &SignedDocument,
        trust: &TrustContext,
    ) -> Result<openssl::x509::X509, IntegrityError> {
        let mut validator = TrustValidator::from_context(trust)?;
        if !self.check_validity_period {
            validator = validator.ignore_validity_period();
        }
        validator.validate_pem(&document.certificate, &trust.requested_scope)
    }
}

fn outcome(scope: &str, result: Result<Violations, (Stage, IntegrityError)>) -> VerificationOutcome {
    match result {
        Ok(violations) => {
            if violations.is_empty() {
                tracing::info!(scope, "integrity check passed");
            } else {
                tracing::warn!(
                    scope,
                    invalid_hash = violations.invalid_hash.len(),
                    missing = violations.missing.len(),
                    extra = violations.extra.len(),
                    "integrity check found modified files"
                );
            }
            VerificationOutcome::from_violations(violations)
        }
        Err((stage, err)) => {
            tracing::warn!(scope, %stage, kind = %err.kind(), "integrity check failed: {err}");
            VerificationOutcome::from(Err(err))
        }
    }
}

/// Read and parse a signature document. An unreadable file and one that
/// does not parse are both reported as missing signature data.
pub fn load_document(path: &Path) -> Result<SignedDocument, IntegrityError> {
    let raw = fs::read_to_string(path).map_err(|_| IntegrityError::SignatureDataNotFound {
        path: path.to_path_buf(),
    })?;
    serde_json::from_str(&raw).map_err(|e| IntegrityError::SignatureDataMalformed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Compare a trusted manifest against the live one.
pub fn diff(expected: &FileManifest, current: &FileManifest) -> Violations {
    let mut violations = Violations::default();
    for (path, digest) in expected.iter() {
        match current.get(path) {
            None => {
                violations.missing.insert(
                    path.to_string(),
                    HashMismatch {
                        expected: digest.to_string(),
                        current: String::new(),
                    },
                );
            }
            Some(live) if live != digest => {
                violations.invalid_hash.insert(
                    path.to_string(),
                    HashMismatch {
                        expected: digest.to_string(),
                        current: live.to_string(),
                    },
                );
            }
            Some(_) => {}
        }
    }
    for (path, live) in current.iter() {
        if !expected.contains(path) {
            violations.extra.insert(
                path.to_string(),
                HashMismatch {
                    expected: String::new(),
                    current: live.to_string(),
                },
            );
        }
    }
    violations
}
