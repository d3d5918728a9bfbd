// main.rs — codeintegrity CLI entry point
//
// Sign commands write a signature document and exit 0. Verify commands print
// a JSON report to stdout and exit 1 when anything is not clean.

mod cli;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use codeintegrity::config::CheckerConfig;
use codeintegrity::integrity::checker::{Checker, DirectoryAppLocator, MemoryCache};
use codeintegrity::integrity::CORE_SCOPE;
use codeintegrity::sign::{self, SigningKey};
use codeintegrity::VerificationOutcome;

use cli::{Cli, Commands, IntegrityAction};

type CliChecker = Checker<DirectoryAppLocator, MemoryCache>;

#[derive(Serialize)]
struct ScopeReport<'a> {
    scope: &'a str,
    checked_at: DateTime<Utc>,
    enforced: bool,
    result: &'a VerificationOutcome,
}

#[derive(Serialize)]
struct InstanceReport<'a> {
    checked_at: DateTime<Utc>,
    enforced: bool,
    passed: bool,
    results: &'a BTreeMap<String, VerificationOutcome>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut config = CheckerConfig::load(&cli.config)?;
    if let Some(root) = cli.server_root {
        config.server_root = root;
    }
    let locator = DirectoryAppLocator::from_config(&config);
    let checker = Checker::new(config, locator, MemoryCache::new());

    match cli.command {
        Commands::Integrity { action } => match action {
            IntegrityAction::SignApp {
                path,
                app_id,
                private_key,
                certificate,
            } => {
                let app_id = match app_id {
                    Some(id) => id,
                    None => app_id_from_path(&path)?,
                };
                let target = SignTarget::App(&app_id);
                cmd_sign(&checker, &path, private_key.as_deref(), &certificate, target)
            }
            IntegrityAction::SignCore {
                path,
                private_key,
                certificate,
            } => {
                let path = path.unwrap_or_else(|| checker.config().server_root.clone());
                cmd_sign(&checker, &path, private_key.as_deref(), &certificate, SignTarget::Core)
            }
            IntegrityAction::VerifyApp {
                app_id,
                path,
                force,
            } => {
                eprintln!("[integrity] Verifying app: {}", app_id);
                let outcome = checker.verify_app_signature(&app_id, path.as_deref(), force);
                report_scope(&checker, &app_id, &outcome)
            }
            IntegrityAction::VerifyCore { force } => {
                eprintln!(
                    "[integrity] Verifying core: {}",
                    checker.config().server_root.display()
                );
                let outcome = checker.verify_core_signature(force);
                report_scope(&checker, CORE_SCOPE, &outcome)
            }
            IntegrityAction::VerifyInstance => cmd_verify_instance(&checker),
        },
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

enum SignTarget<'a> {
    App(&'a str),
    Core,
}

/// Folder name of an app root, e.g. `apps/SomeApp` → `SomeApp`.
fn app_id_from_path(path: &Path) -> Result<String> {
    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    match canonical.file_name().and_then(|name| name.to_str()) {
        Some(name) => Ok(name.to_string()),
        None => bail!(
            "cannot derive an app id from {}, pass --app-id",
            path.display()
        ),
    }
}

fn cmd_sign(
    checker: &CliChecker,
    path: &Path,
    private_key: Option<&Path>,
    certificate: &Path,
    target: SignTarget<'_>,
) -> Result<()> {
    let pem = sign::load_private_key_pem(private_key)?;
    let key = SigningKey::from_pem(&pem).context("parsing private key")?;
    let certificate_pem = fs::read_to_string(certificate)
        .with_context(|| format!("reading certificate {}", certificate.display()))?;

    let written = match target {
        SignTarget::App(app_id) => checker.write_app_signature(app_id, path, &key, &certificate_pem),
        SignTarget::Core => checker.write_core_signature(path, &key, &certificate_pem),
    }
    .with_context(|| format!("signing {}", path.display()))?;

    eprintln!("[integrity] Successfully signed \"{}\"", path.display());
    eprintln!("  Signature: {}", written.display());
    Ok(())
}

fn report_scope(checker: &CliChecker, scope: &str, outcome: &VerificationOutcome) -> Result<()> {
    let enforced = checker.is_code_check_enforced();
    if !enforced {
        eprintln!("[integrity] Code checks are not enforced on this installation");
    }
    print_status(scope, outcome);

    let report = ScopeReport {
        scope,
        checked_at: Utc::now(),
        enforced,
        result: outcome,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !outcome.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_verify_instance(checker: &CliChecker) -> Result<()> {
    let enforced = checker.is_code_check_enforced();
    if !enforced {
        eprintln!("[integrity] Code checks are not enforced on this installation");
    }
    let results = checker.run_instance_verification();
    for (scope, outcome) in &results {
        print_status(scope, outcome);
    }

    let report = InstanceReport {
        checked_at: Utc::now(),
        enforced,
        passed: checker.has_passed_check(),
        results: &results,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !results.values().all(VerificationOutcome::is_clean) {
        std::process::exit(1);
    }
    Ok(())
}

fn print_status(scope: &str, outcome: &VerificationOutcome) {
    match outcome {
        VerificationOutcome::Clean => eprintln!("[integrity] {}: OK", scope),
        VerificationOutcome::Violations(violations) => eprintln!(
            "[integrity] {}: {} invalid, {} missing, {} extra",
            scope,
            violations.invalid_hash.len(),
            violations.missing.len(),
            violations.extra.len()
        ),
        VerificationOutcome::Fatal(fatal) => {
            eprintln!("[integrity] {}: {} ({})", scope, fatal.message, fatal.kind)
        }
    }
}
