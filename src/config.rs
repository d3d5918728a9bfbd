// config.rs — Checker configuration
//
// Loaded from a JSON file; every field has a default so an empty object `{}`
// is a valid configuration. The trust anchor is not configurable, it is
// always `<server_root>/resources/codesigning/root.crt`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Release channels on which unsigned code is expected and checks are not enforced.
const UNSIGNED_CHANNELS: &[&str] = &["", "git"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    pub server_root: PathBuf,
    pub release_channel: String,
    pub integrity_check_disabled: bool,
    pub apps_dirs: Vec<PathBuf>,
    pub shipped_apps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_directory: Option<PathBuf>,
    pub known_variants: Vec<KnownVariantConfig>,
    /// Reject certificates outside their validity period. Chain and scope
    /// are checked either way.
    pub check_certificate_validity: bool,
}

/// Extra blessed contents for one mutable file, keyed by the relative path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownVariantConfig {
    /// `core` or an app id; the path is relative to that scope's root.
    #[serde(default = "default_variant_scope")]
    pub scope: String,
    pub path: String,
    /// Live digest → digest recorded in the manifest for that content.
    pub accepted: BTreeMap<String, String>,
}

fn default_variant_scope() -> String {
    crate::integrity::CORE_SCOPE.to_string()
}

impl Default for CheckerConfig {
    fn default() -> Self {
        CheckerConfig {
            server_root: PathBuf::from("."),
            release_channel: "stable".to_string(),
            integrity_check_disabled: false,
            apps_dirs: vec![PathBuf::from("apps")],
            shipped_apps: Vec::new(),
            data_directory: None,
            known_variants: Vec::new(),
            check_certificate_validity: true,
        }
    }
}

impl CheckerConfig {
    /// Load the configuration at `path`, or the defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let data =
            fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let config: CheckerConfig = serde_json::from_str(&data)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Whether failed checks are binding for this installation.
    pub fn is_code_check_enforced(&self) -> bool {
        if UNSIGNED_CHANNELS.contains(&self.release_channel.as_str()) {
            return false;
        }
        !self.integrity_check_disabled
    }

    /// Absolute (or server-root-joined) app directories.
    pub fn resolved_apps_dirs(&self) -> Vec<PathBuf> {
        self.apps_dirs
            .iter()
            .map(|dir| self.resolve(dir))
            .collect()
    }

    pub fn resolved_data_directory(&self) -> Option<PathBuf> {
        self.data_directory.as_ref().map(|dir| self.resolve(dir))
    }

    fn resolve(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.server_root.join(dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config: CheckerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.release_channel, "stable");
        assert!(!config.integrity_check_disabled);
        assert_eq!(config.apps_dirs, vec![PathBuf::from("apps")]);
        assert!(config.check_certificate_validity);
        assert!(config.is_code_check_enforced());
    }

    #[test]
    fn validity_period_check_can_be_switched_off() {
        let config: CheckerConfig =
            serde_json::from_str(r#"{ "check_certificate_validity": false }"#).unwrap();
        assert!(!config.check_certificate_validity);
        assert_eq!(config.release_channel, "stable");
    }

    #[test]
    fn enforcement_depends_on_channel_and_switch() {
        let mut config = CheckerConfig::default();
        for (channel, enforced) in [("stable", true), ("beta", true), ("git", false), ("", false)] {
            config.release_channel = channel.to_string();
            assert_eq!(config.is_code_check_enforced(), enforced, "channel {channel:?}");
        }

        for channel in ["stable", "git"] {
            config.release_channel = channel.to_string();
            config.integrity_check_disabled = true;
            assert!(!config.is_code_check_enforced());
        }
    }

    #[test]
    fn relative_dirs_resolve_against_server_root() {
        let config = CheckerConfig {
            server_root: PathBuf::from("/srv/cloud"),
            apps_dirs: vec![PathBuf::from("apps"), PathBuf::from("/opt/extra-apps")],
            data_directory: Some(PathBuf::from("data")),
            ..CheckerConfig::default()
        };
        assert_eq!(
            config.resolved_apps_dirs(),
            vec![PathBuf::from("/srv/cloud/apps"), PathBuf::from("/opt/extra-apps")]
        );
        assert_eq!(
            config.resolved_data_directory(),
            Some(PathBuf::from("/srv/cloud/data"))
        );
    }

    #[test]
    fn load_reads_known_variants() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("integrity.json");
        fs::write(
            &path,
            r#"{
  "release_channel": "git",
  "shipped_apps": ["files"],
  "known_variants": [
    { "path": "subfolder/.htaccess", "accepted": { "aa": "bb" } }
  ]
}"#,
        )
        .unwrap();

        let config = CheckerConfig::load(&path).unwrap();
        assert_eq!(config.shipped_apps, vec!["files".to_string()]);
        assert_eq!(config.known_variants[0].scope, "core");
        assert_eq!(config.known_variants[0].path, "subfolder/.htaccess");
        assert_eq!(config.known_variants[0].accepted["aa"], "bb");
        assert!(!config.is_code_check_enforced());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckerConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.release_channel, "stable");
    }
}
