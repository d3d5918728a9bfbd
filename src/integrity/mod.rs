// integrity/ — Code-integrity signing and verification
//
// model.rs     — Manifest, signed document and outcome types (serde)
// canonical.rs — Canonical JSON over which signatures are computed
// enumerate.rs — Covered-file enumeration with the fixed exclusion policy
// hasher.rs    — Content digests, incl. known-mutable file normalization
// builder.rs   — Enumerate + hash into a FileManifest
// signer.rs    — Sign a tree and write its signature document
// trust.rs     — Certificate chain and scope validation
// verify.rs    — Verify a live tree against its signature document
// checker.rs   — Enforcement, result storage and instance-wide checks

pub mod builder;
pub mod canonical;
pub mod checker;
pub mod enumerate;
pub mod hasher;
pub mod model;
pub mod signer;
pub mod trust;
pub mod verify;

/// Scope name of the core codebase; certificates with this CN are trusted
/// for every scope.
pub const CORE_SCOPE: &str = "core";

/// Signature document location inside an app root.
pub const APP_SIGNATURE_PATH: &str = "appinfo/signature.json";

/// Signature document location inside the core root.
pub const CORE_SIGNATURE_PATH: &str = "core/signature.json";

/// Pinned root CA location inside the core root.
pub const ROOT_CERTIFICATE_PATH: &str = "resources/codesigning/root.crt";
