// codeintegrity — Code-integrity signing and verification
//
// hash.rs      — SHA-512 digests over bytes and files
// sign.rs      — RSA-PSS primitives and key / certificate loading
// error.rs     — Fatal error taxonomy
// config.rs    — Checker configuration (JSON, defaulted)
// integrity/   — Manifests, signer, trust validation, verifier, checker

pub mod config;
pub mod error;
pub mod hash;
pub mod integrity;
pub mod sign;

#[cfg(test)]
mod testutil;

pub use error::{FatalKind, IntegrityError};
pub use integrity::model::{FileManifest, SignedDocument, VerificationOutcome, Violations};
