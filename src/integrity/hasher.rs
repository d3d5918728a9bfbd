use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::KnownVariantConfig;
use crate::error::IntegrityError;
use crate::hash;

/// Installers append local rules below this line in the root `.htaccess`.
pub const HTACCESS_MARKER: &str = "#### DO NOT CHANGE ANYTHING ABOVE THIS LINE ####";

/// How a known-mutable file's content is mapped to the digest compared
/// against the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalization {
    /// Hash only the bytes before `marker`, provided it occurs exactly once.
    TruncateAtMarker(String),
    /// Live digest of a blessed variant → digest to use in its place.
    KnownVariants(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutableFileRule {
    /// Exact relative path the rule applies to.
    pub path: String,
    pub normalization: Normalization,
}

/// Finite allow-list of files whose content may legitimately change after
/// signing. Files not listed are always hashed verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutableFilePolicy {
    rules: Vec<MutableFileRule>,
}

impl MutableFilePolicy {
    pub fn none() -> Self {
        Self::default()
    }

    /// Built-in policy for the core tree: the root `.htaccess`.
    pub fn core() -> Self {
        Self::none().with_rule(MutableFileRule {
            path: ".htaccess".to_string(),
            normalization: Normalization::TruncateAtMarker(HTACCESS_MARKER.to_string()),
        })
    }

    pub fn with_rule(mut self, rule: MutableFileRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add the configured variants belonging to `scope`.
    pub fn with_known_variants(mut self, scope: &str, variants: &[KnownVariantConfig]) -> Self {
        for variant in variants.iter().filter(|v| v.scope == scope) {
            self.rules.push(MutableFileRule {
                path: variant.path.clone(),
                normalization: Normalization::KnownVariants(variant.accepted.clone()),
            });
        }
        self
    }

    fn rules_for<'a>(&'a self, relative: &'a str) -> impl Iterator<Item = &'a Normalization> {
        self.rules
            .iter()
            .filter(move |r| r.path == relative)
            .map(|r| &r.normalization)
    }

    fn covers(&self, relative: &str) -> bool {
        self.rules.iter().any(|r| r.path == relative)
    }
}

/// Computes the digest recorded for a file.
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    policy: MutableFilePolicy,
}

impl ContentHasher {
    pub fn new(policy: MutableFilePolicy) -> Self {
        ContentHasher { policy }
    }

    /// Digest of `root/relative`. Known-mutable files are normalized first;
    /// content matching no rule is hashed as-is.
    pub fn hash(&self, root: &Path, relative: &str) -> Result<String, IntegrityError> {
        let path = root.join(relative);
        if !self.policy.covers(relative) {
            return hash::hash_file(&path);
        }

        let data = fs::read(&path).map_err(|e| IntegrityError::not_readable(&path, e))?;
        let live = hash::sha512_hex(&data);
        for normalization in self.policy.rules_for(relative) {
            if let Some(digest) = normalize(normalization, &data, &live) {
                tracing::debug!(file = relative, "normalized known mutable file");
                return Ok(digest);
            }
        }
        Ok(live)
    }
}

fn normalize(normalization: &Normalization, data: &[u8], live: &str) -> Option<String> {
    match normalization {
        Normalization::TruncateAtMarker(marker) => {
            let marker = marker.as_bytes();
            if marker.is_empty() || data.len() < marker.len() {
                return None;
            }
            let mut positions = data
                .windows(marker.len())
                .enumerate()
                .filter(|(_, window)| *window == marker)
                .map(|(i, _)| i);
            let first = positions.next()?;
            if positions.next().is_some() {
                return None;
            }
            Some(hash::sha512_hex(&data[..first]))
        }
        Normalization::KnownVariants(accepted) => accepted.get(live).cloned(),
    }
}
