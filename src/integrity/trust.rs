use openssl::nid::Nid;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::verify::X509VerifyFlags;
use openssl::x509::{X509Ref, X509StoreContext, X509};

use crate::error::IntegrityError;
use crate::integrity::CORE_SCOPE;
use crate::sign;

/// Pinned trust anchor plus the scope a signature document must be valid for.
#[derive(Debug, Clone)]
pub struct TrustContext {
    pub root_certificate_pem: Vec<u8>,
    pub requested_scope: String,
}

impl TrustContext {
    pub fn new(root_certificate_pem: Vec<u8>, requested_scope: impl Into<String>) -> Self {
        TrustContext {
            root_certificate_pem,
            requested_scope: requested_scope.into(),
        }
    }
}

/// Decides whether a signing certificate may vouch for a scope.
///
/// A certificate passes when it chains to the pinned root and its subject
/// CN equals the requested scope. CN `core` passes for every scope.
pub struct TrustValidator {
    root: X509,
    check_validity_period: bool,
}

impl TrustValidator {
    pub fn new(root: X509) -> Self {
        TrustValidator {
            root,
            check_validity_period: true,
        }
    }

    pub fn from_pem(root_pem: &[u8]) -> Result<Self, IntegrityError> {
        let root = X509::from_pem(root_pem).map_err(|e| {
            IntegrityError::certificate_invalid(format!("Root certificate could not be parsed: {e}"))
        })?;
        Ok(Self::new(root))
    }

    pub fn from_context(trust: &TrustContext) -> Result<Self, IntegrityError> {
        Self::from_pem(&trust.root_certificate_pem)
    }

    /// Accept certificates outside their notBefore/notAfter window.
    pub fn ignore_validity_period(mut self) -> Self {
        self.check_validity_period = false;
        self
    }

    pub fn validate(&self, certificate: &X509Ref, requested_scope: &str) -> Result<(), IntegrityError> {
        self.validate_chain(certificate)?;

        let current = common_name(certificate)?;
        if current == requested_scope || current == CORE_SCOPE {
            tracing::debug!(scope = requested_scope, cn = %current, "certificate trusted");
            return Ok(());
        }
        Err(IntegrityError::CertificateScopeMismatch {
            requested: requested_scope.to_string(),
            current,
        })
    }

    /// Parse `certificate_pem` and validate it for `requested_scope`.
    pub fn validate_pem(&self, certificate_pem: &str, requested_scope: &str) -> Result<X509, IntegrityError> {
        let certificate = sign::parse_certificate(certificate_pem.as_bytes())?;
        self.validate(&certificate, requested_scope)?;
        Ok(certificate)
    }

    fn validate_chain(&self, certificate: &X509Ref) -> Result<(), IntegrityError> {
        let store_error =
            |e: openssl::error::ErrorStack| IntegrityError::certificate_invalid(e.to_string());

        let mut builder = X509StoreBuilder::new().map_err(store_error)?;
        builder.add_cert(self.root.clone()).map_err(store_error)?;
        if !self.check_validity_period {
            builder
                .set_flags(X509VerifyFlags::NO_CHECK_TIME)
                .map_err(store_error)?;
        }
        let store = builder.build();

        let untrusted = Stack::<X509>::new().map_err(store_error)?;
        let mut context = X509StoreContext::new().map_err(store_error)?;
        let failure = context
            .init(&store, certificate, &untrusted, |ctx| {
                if ctx.verify_cert()? {
                    Ok(None)
                } else {
                    Ok(Some(ctx.error().error_string().to_string()))
                }
            })
            .map_err(store_error)?;

        match failure {
            None => Ok(()),
            Some(reason) => Err(IntegrityError::certificate_invalid(reason)),
        }
    }
}

/// First subject CN of `certificate`.
pub fn common_name(certificate: &X509Ref) -> Result<String, IntegrityError> {
    let entry = certificate
        .subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .ok_or_else(|| IntegrityError::certificate_invalid("Certificate has no common name"))?;
    let cn = entry
        .data()
        .as_utf8()
        .map_err(|e| IntegrityError::certificate_invalid(e.to_string()))?;
    Ok(cn.to_string())
}
