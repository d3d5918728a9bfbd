#![allow(dead_code)]

//! Shared fixtures for integration tests: the unit tests' code-signing PKI
//! and helpers to lay out app and core trees.

#[path = "../../src/testutil/pki.rs"]
mod pki;

pub use pki::{pki, Identity};

use codeintegrity::integrity::ROOT_CERTIFICATE_PATH;
use codeintegrity::sign::SigningKey;
use std::fs;
use std::path::{Path, PathBuf};

impl Identity {
    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_pem(&self.key_pem).unwrap()
    }
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Core installation with the pinned root certificate in place.
pub fn create_install(root: &Path) {
    let anchor = root.join(ROOT_CERTIFICATE_PATH);
    fs::create_dir_all(anchor.parent().unwrap()).unwrap();
    fs::write(anchor, &pki().root_pem).unwrap();
    write(root, "index.php", "<?php\n");
    write(root, "core/js/main.js", "console.log('core');\n");
}

/// `<root>/apps/<app_id>` with `AnotherFile.txt` and `subfolder/file.txt`.
pub fn create_app(root: &Path, app_id: &str) -> PathBuf {
    let app = root.join("apps").join(app_id);
    write(&app, "appinfo/info.xml", "<info/>\n");
    write(&app, "AnotherFile.txt", "another file\n");
    write(&app, "subfolder/file.txt", "nested file\n");
    app
}

/// Write an identity to `dir` as `<name>.key` / `<name>.crt`.
pub fn write_identity(dir: &Path, name: &str, identity: &Identity) -> (PathBuf, PathBuf) {
    let key = dir.join(format!("{name}.key"));
    let crt = dir.join(format!("{name}.crt"));
    fs::write(&key, &identity.key_pem).unwrap();
    fs::write(&crt, &identity.certificate_pem).unwrap();
    (key, crt)
}
