//! Throwaway code-signing PKI: a pinned root CA plus leaf certificates for
//! the scopes under test. Generated once per test binary. Depends on
//! openssl and chrono only, so integration tests can include it as well.

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use std::sync::OnceLock;

pub struct Identity {
    pub certificate_pem: String,
    pub key_pem: Vec<u8>,
}

pub struct TestPki {
    pub root_pem: Vec<u8>,
    /// CN=SomeApp
    pub app: Identity,
    /// CN=AnotherScope
    pub another_scope: Identity,
    /// CN=core
    pub core: Identity,
    /// CN=SomeApp, issued by a CA that is not pinned.
    pub untrusted: Identity,
    /// CN=SomeApp, validity period over.
    pub expired: Identity,
}

pub fn pki() -> &'static TestPki {
    static PKI: OnceLock<TestPki> = OnceLock::new();
    PKI.get_or_init(|| {
        let (root, root_key) = ca("Code Signing Root");
        let (rogue, rogue_key) = ca("Rogue CA");
        let now = chrono::Utc::now().timestamp();
        let valid = (now - 86_400, now + 365 * 86_400);
        TestPki {
            root_pem: root.to_pem().unwrap(),
            app: leaf("SomeApp", &root, &root_key, valid, 2),
            another_scope: leaf("AnotherScope", &root, &root_key, valid, 3),
            core: leaf("core", &root, &root_key, valid, 4),
            untrusted: leaf("SomeApp", &rogue, &rogue_key, valid, 5),
            expired: leaf("SomeApp", &root, &root_key, (now - 30 * 86_400, now - 86_400), 6),
        }
    })
}

fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

fn ca(cn: &str) -> (X509, PKey<Private>) {
    let key = rsa_key();
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("O", "Code Signing CA").unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(3650).unwrap())
        .unwrap();
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    builder
        .append_extension(
            KeyUsage::new()
                .critical()
                .key_cert_sign()
                .crl_sign()
                .build()
                .unwrap(),
        )
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    (builder.build(), key)
}

fn leaf(
    cn: &str,
    issuer: &X509,
    issuer_key: &PKey<Private>,
    (not_before, not_after): (i64, i64),
    serial: u32,
) -> Identity {
    let key = rsa_key();
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(issuer.subject_name()).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(not_before).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(not_after).unwrap())
        .unwrap();
    builder.sign(issuer_key, MessageDigest::sha256()).unwrap();

    Identity {
        certificate_pem: String::from_utf8(builder.build().to_pem().unwrap()).unwrap(),
        key_pem: key.private_key_to_pem_pkcs8().unwrap(),
    }
}
