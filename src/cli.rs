// cli.rs — Command-line interface definitions (clap derive)
//
// Defines the top-level `codeintegrity` command and the `integrity` tree:
//   codeintegrity integrity sign-app         — sign an app folder
//   codeintegrity integrity sign-core        — sign a core tree
//   codeintegrity integrity verify-app       — verify one app
//   codeintegrity integrity verify-core      — verify the core installation
//   codeintegrity integrity verify-instance  — verify core and all apps

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codeintegrity")]
#[command(about = "Code signing and integrity checks for app and core installations")]
#[command(version)]
pub struct Cli {
    /// Path to the checker configuration (defaults apply if absent)
    #[arg(long, global = true, default_value = "config/integrity.json")]
    pub config: PathBuf,

    /// Core installation root (overrides `server_root` from the config)
    #[arg(long, global = true)]
    pub server_root: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Code-integrity signing and verification
    Integrity {
        #[command(subcommand)]
        action: IntegrityAction,
    },
}

#[derive(Subcommand)]
pub enum IntegrityAction {
    /// Sign an app and write appinfo/signature.json
    SignApp {
        /// App root folder
        #[arg(long)]
        path: PathBuf,

        /// App id whose known variants apply (default: the folder name)
        #[arg(long)]
        app_id: Option<String>,

        /// PEM private key (or set CODEINTEGRITY_PRIVATE_KEY_PEM)
        #[arg(long)]
        private_key: Option<PathBuf>,

        /// PEM certificate issued for the app id
        #[arg(long)]
        certificate: PathBuf,
    },

    /// Sign a core tree and write core/signature.json
    SignCore {
        /// Core root folder (default: the server root)
        #[arg(long)]
        path: Option<PathBuf>,

        /// PEM private key (or set CODEINTEGRITY_PRIVATE_KEY_PEM)
        #[arg(long)]
        private_key: Option<PathBuf>,

        /// PEM certificate issued for `core`
        #[arg(long)]
        certificate: PathBuf,
    },

    /// Verify one app against its signature
    VerifyApp {
        /// App id, also the certificate scope required
        app_id: String,

        /// Verify this folder instead of looking the app up
        #[arg(long)]
        path: Option<PathBuf>,

        /// Run even if checks are not enforced on this installation
        #[arg(long)]
        force: bool,
    },

    /// Verify the core installation against core/signature.json
    VerifyCore {
        /// Run even if checks are not enforced on this installation
        #[arg(long)]
        force: bool,
    },

    /// Verify core and every installed app
    VerifyInstance,
}
