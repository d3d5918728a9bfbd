use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::CheckerConfig;
use crate::error::IntegrityError;
use crate::integrity::builder::ManifestBuilder;
use crate::integrity::hasher::MutableFilePolicy;
use crate::integrity::model::{OutcomeRecord, VerificationOutcome};
use crate::integrity::signer::{SignatureTarget, Signer};
use crate::integrity::trust::TrustContext;
use crate::integrity::verify::{self, Verifier};
use crate::integrity::{APP_SIGNATURE_PATH, CORE_SCOPE, CORE_SIGNATURE_PATH, ROOT_CERTIFICATE_PATH};
use crate::sign::SigningKey;

/// Cache key under which per-scope results are stored.
pub const CACHE_KEY: &str = "oc.integritycheck.checker";

/// Resolves app ids to their installation directories.
pub trait AppLocator {
    fn app_path(&self, app_id: &str) -> Result<PathBuf, IntegrityError>;
    /// Ids of every app found in the apps folders.
    fn all_apps(&self) -> Vec<String>;
    fn is_shipped(&self, app_id: &str) -> bool;
}

/// Key/value store owned by the caller, e.g. a distributed cache.
pub trait ResultCache {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn delete(&self, key: &str);
}

/// Finds apps as `<apps_dir>/<app_id>` directories. An app folder counts
/// only if it carries `appinfo/info.xml`.
#[derive(Debug, Clone, Default)]
pub struct DirectoryAppLocator {
    apps_dirs: Vec<PathBuf>,
    shipped: BTreeSet<String>,
}

impl DirectoryAppLocator {
    pub fn new(apps_dirs: Vec<PathBuf>, shipped: impl IntoIterator<Item = String>) -> Self {
        DirectoryAppLocator {
            apps_dirs,
            shipped: shipped.into_iter().collect(),
        }
    }

    pub fn from_config(config: &CheckerConfig) -> Self {
        Self::new(config.resolved_apps_dirs(), config.shipped_apps.iter().cloned())
    }
}

fn is_valid_app_id(app_id: &str) -> bool {
    !app_id.is_empty()
        && !app_id.starts_with('.')
        && !app_id.contains(['/', '\\'])
}

impl AppLocator for DirectoryAppLocator {
    fn app_path(&self, app_id: &str) -> Result<PathBuf, IntegrityError> {
        if is_valid_app_id(app_id) {
            for dir in &self.apps_dirs {
                let candidate = dir.join(app_id);
                if candidate.is_dir() {
                    return Ok(candidate);
                }
            }
        }
        Err(IntegrityError::AppNotFound(app_id.to_string()))
    }

    fn all_apps(&self) -> Vec<String> {
        let mut apps = BTreeSet::new();
        for dir in &self.apps_dirs {
            let Ok(entries) = fs::read_dir(dir) else {
                tracing::debug!(dir = %dir.display(), "apps folder not readable, skipping");
                continue;
            };
            for entry in entries.flatten() {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if is_valid_app_id(&name) && entry.path().join("appinfo/info.xml").is_file() {
                    apps.insert(name);
                }
            }
        }
        apps.into_iter().collect()
    }

    fn is_shipped(&self, app_id: &str) -> bool {
        self.shipped.contains(app_id)
    }
}

/// Process-local [`ResultCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }
}

/// Runs app and core checks for one installation and records their results.
pub struct Checker<L, C> {
    config: CheckerConfig,
    locator: L,
    cache: C,
}

impl<L: AppLocator, C: ResultCache> Checker<L, C> {
    pub fn new(config: CheckerConfig, locator: L, cache: C) -> Self {
        Checker {
            config,
            locator,
            cache,
        }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    pub fn is_code_check_enforced(&self) -> bool {
        self.config.is_code_check_enforced()
    }

    fn app_builder(&self, app_id: &str) -> ManifestBuilder {
        ManifestBuilder::for_app(
            MutableFilePolicy::none().with_known_variants(app_id, &self.config.known_variants),
        )
    }

    fn core_builder(&self, root: &Path) -> ManifestBuilder {
        let mut extra_dirs = self.config.resolved_apps_dirs();
        extra_dirs.extend(self.config.resolved_data_directory());
        ManifestBuilder::for_core(
            root,
            &extra_dirs,
            MutableFilePolicy::core().with_known_variants(CORE_SCOPE, &self.config.known_variants),
        )
    }

    /// Sign app `app_id` located at `root` and write `appinfo/signature.json`.
    /// Hashes with the same variant policy [`Self::verify_app_signature`] uses.
    pub fn write_app_signature(
        &self,
        app_id: &str,
        root: &Path,
        key: &SigningKey,
        certificate_pem: &str,
    ) -> Result<PathBuf, IntegrityError> {
        Signer::new(SignatureTarget::App, self.app_builder(app_id))
            .write_signature(root, key, certificate_pem)
    }

    /// Sign the core tree at `root` and write `core/signature.json`.
    pub fn write_core_signature(
        &self,
        root: &Path,
        key: &SigningKey,
        certificate_pem: &str,
    ) -> Result<PathBuf, IntegrityError> {
        Signer::new(SignatureTarget::Core, self.core_builder(root))
            .write_signature(root, key, certificate_pem)
    }

    /// Verify one app. With `root_override` the app locator is not consulted.
    /// Returns [`VerificationOutcome::Clean`] without checking anything when
    /// checks are not enforced, unless `force` is set.
    pub fn verify_app_signature(
        &self,
        app_id: &str,
        root_override: Option<&Path>,
        force: bool,
    ) -> VerificationOutcome {
        if !force && !self.is_code_check_enforced() {
            return VerificationOutcome::Clean;
        }

        let outcome = match root_override {
            Some(root) => self.check_app(app_id, root),
            None => match self.locator.app_path(app_id) {
                Ok(root) => self.check_app(app_id, &root),
                Err(err) => VerificationOutcome::from(Err(err)),
            },
        };
        self.store_results(app_id, &outcome);
        outcome
    }

    fn check_app(&self, app_id: &str, root: &Path) -> VerificationOutcome {
        self.check(
            &root.join(APP_SIGNATURE_PATH),
            root,
            app_id,
            self.app_builder(app_id),
        )
    }

    pub fn verify_core_signature(&self, force: bool) -> VerificationOutcome {
        if !force && !self.is_code_check_enforced() {
            return VerificationOutcome::Clean;
        }

        let root = &self.config.server_root;
        let outcome = self.check(
            &root.join(CORE_SIGNATURE_PATH),
            root,
            CORE_SCOPE,
            self.core_builder(root),
        );
        self.store_results(CORE_SCOPE, &outcome);
        outcome
    }

    /// Loads the document before the trust anchor, so a tree without a
    /// signature reports missing signature data even on a broken install.
    fn check(
        &self,
        document_path: &Path,
        root: &Path,
        scope: &str,
        builder: ManifestBuilder,
    ) -> VerificationOutcome {
        let document = match verify::load_document(document_path) {
            Ok(document) => document,
            Err(err) => {
                tracing::warn!(scope, kind = %err.kind(), "integrity check failed: {err}");
                return VerificationOutcome::from(Err(err));
            }
        };
        let root_pem = match self.root_certificate() {
            Ok(pem) => pem,
            Err(err) => {
                tracing::warn!(scope, kind = %err.kind(), "integrity check failed: {err}");
                return VerificationOutcome::from(Err(err));
            }
        };
        let mut verifier = Verifier::new(builder);
        if !self.config.check_certificate_validity {
            verifier = verifier.ignore_validity_period();
        }
        verifier.verify_document(&document, root, &TrustContext::new(root_pem, scope))
    }

    fn root_certificate(&self) -> Result<Vec<u8>, IntegrityError> {
        let path = self.config.server_root.join(ROOT_CERTIFICATE_PATH);
        fs::read(&path).map_err(|e| {
            IntegrityError::certificate_invalid(format!(
                "Root certificate {} could not be read: {e}",
                path.display()
            ))
        })
    }

    /// Clear stored results, then verify core and every installed app.
    ///
    /// Shipped apps are always checked. Other apps are checked only when
    /// they carry a signature document.
    pub fn run_instance_verification(&self) -> BTreeMap<String, VerificationOutcome> {
        self.clean_results();

        let mut outcomes = BTreeMap::new();
        outcomes.insert(CORE_SCOPE.to_string(), self.verify_core_signature(false));

        for app_id in self.locator.all_apps() {
            let signed = self.locator.is_shipped(&app_id)
                || self
                    .locator
                    .app_path(&app_id)
                    .is_ok_and(|root| root.join(APP_SIGNATURE_PATH).is_file());
            if !signed {
                tracing::debug!(app = %app_id, "unsigned third-party app, skipped");
                continue;
            }
            let outcome = self.verify_app_signature(&app_id, None, false);
            outcomes.insert(app_id, outcome);
        }
        outcomes
    }

    /// Stored results, or `None` if no check has stored any since the last reset.
    pub fn get_results(&self) -> Option<BTreeMap<String, OutcomeRecord>> {
        let raw = self.cache.get(CACHE_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(results) => Some(results),
            Err(err) => {
                tracing::warn!("discarding unreadable stored results: {err}");
                None
            }
        }
    }

    /// True iff results were stored and none of them reports a problem.
    pub fn has_passed_check(&self) -> bool {
        self.get_results().is_some_and(|results| results.is_empty())
    }

    fn store_results(&self, scope: &str, outcome: &VerificationOutcome) {
        let mut results = self.get_results().unwrap_or_default();
        if outcome.is_clean() {
            results.remove(scope);
        } else {
            results.insert(scope.to_string(), OutcomeRecord::from(outcome.clone()));
        }
        match serde_json::to_string(&results) {
            Ok(json) => self.cache.set(CACHE_KEY, json),
            Err(err) => tracing::warn!(scope, "could not store results: {err}"),
        }
    }

    fn clean_results(&self) {
        self.cache.delete(CACHE_KEY);
    }
}
