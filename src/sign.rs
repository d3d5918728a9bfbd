use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use openssl::hash::MessageDigest;
use openssl::pkey::{HasPublic, PKey, PKeyRef, Private};
use openssl::rsa::Padding;
use openssl::sign::{RsaPssSaltlen, Signer, Verifier};
use openssl::x509::X509;
use std::path::Path;
use zeroize::Zeroizing;

use crate::error::IntegrityError;

/// Environment variable that may carry the PEM-encoded signing key.
pub const PRIVATE_KEY_ENV: &str = "CODEINTEGRITY_PRIVATE_KEY_PEM";

/// RSA private key used to sign manifests.
pub struct SigningKey {
    key: PKey<Private>,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("bits", &self.key.bits())
            .field("key", &"<redacted>")
            .finish()
    }
}

impl SigningKey {
    /// Parse a PEM-encoded (PKCS#1 or PKCS#8) RSA private key.
    pub fn from_pem(pem: &[u8]) -> Result<Self, IntegrityError> {
        let key = PKey::private_key_from_pem(pem)?;
        Ok(Self { key })
    }

    /// RSA-PSS signature (SHA-512, MGF1-SHA-512, salt length 0) over `data`,
    /// base64-encoded.
    pub fn sign(&self, data: &[u8]) -> Result<String, IntegrityError> {
        let mut signer = Signer::new(MessageDigest::sha512(), &self.key)?;
        signer.set_rsa_padding(Padding::PKCS1_PSS)?;
        signer.set_rsa_mgf1_md(MessageDigest::sha512())?;
        signer.set_rsa_pss_saltlen(RsaPssSaltlen::custom(0))?;
        signer.update(data)?;
        Ok(B64.encode(signer.sign_to_vec()?))
    }

    /// Fail with [`IntegrityError::KeyMismatch`] unless `certificate` carries
    /// this key's public half.
    pub fn ensure_matches(&self, certificate: &X509) -> Result<(), IntegrityError> {
        let public = certificate.public_key()?;
        if public.public_eq(&self.key) {
            Ok(())
        } else {
            Err(IntegrityError::KeyMismatch)
        }
    }
}

/// Verify a base64 RSA-PSS signature produced by [`SigningKey::sign`].
///
/// Any failure (bad base64, non-RSA key, wrong signature) yields `false`.
pub fn verify<T: HasPublic>(public_key: &PKeyRef<T>, data: &[u8], signature_b64: &str) -> bool {
    let Ok(signature) = B64.decode(signature_b64.trim()) else {
        return false;
    };
    let check = || -> Result<bool, openssl::error::ErrorStack> {
        let mut verifier = Verifier::new(MessageDigest::sha512(), public_key)?;
        verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
        verifier.set_rsa_mgf1_md(MessageDigest::sha512())?;
        verifier.set_rsa_pss_saltlen(RsaPssSaltlen::custom(0))?;
        verifier.update(data)?;
        verifier.verify(&signature)
    };
    check().unwrap_or(false)
}

/// Parse a PEM-encoded X.509 certificate.
pub fn parse_certificate(pem: &[u8]) -> Result<X509, IntegrityError> {
    X509::from_pem(pem).map_err(|e| {
        IntegrityError::certificate_invalid(format!("Certificate could not be parsed: {e}"))
    })
}

/// Load the signing key PEM from the environment variable or a keyfile path.
pub fn load_private_key_pem(keyfile: Option<&Path>) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    if let Ok(key) = std::env::var(PRIVATE_KEY_ENV) {
        if !key.trim().is_empty() {
            return Ok(Zeroizing::new(key.into_bytes()));
        }
    }

    if let Some(path) = keyfile {
        let contents = std::fs::read(path)
            .with_context(|| format!("reading private key {}", path.display()))?;
        return Ok(Zeroizing::new(contents));
    }

    bail!(
        "No signing key found. Set {} env var or pass --private-key <path>",
        PRIVATE_KEY_ENV
    );
}
