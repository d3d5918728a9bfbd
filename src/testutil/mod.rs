//! Test fixtures shared by the unit tests.

mod pki;

pub use pki::{pki, Identity, TestPki};

use std::fs;
use std::path::Path;

use crate::integrity::ROOT_CERTIFICATE_PATH;
use crate::sign::SigningKey;

impl Identity {
    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_pem(&self.key_pem).unwrap()
    }
}

impl TestPki {
    /// Place the pinned root certificate under `server_root`.
    pub fn install_root(&self, server_root: &Path) {
        let path = server_root.join(ROOT_CERTIFICATE_PATH);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, &self.root_pem).unwrap();
    }
}
