//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── resolver: ResolverConfig   # credentials file, interactive login, token cache
//! ├── storage: StorageConfig     # account, container, upload mode, timeouts
//! ├── log_format: LogFormat      # text or json on stderr
//! └── command: Command           # the storage operation to run
//! ```
//!
//! Every option can be provided as an argument or an environment variable.
//!
//! ```bash
//! paeio --account acct01 --container landing ls raw/
//! AZURE_STORAGE_ACCOUNT=acct01 paeio read az://landing/raw/a.csv
//! ```

use std::process;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use paeio_credential::ResolverConfig;
use paeio_storage::StorageConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::command::Command;
use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Output format of the diagnostic log written to stderr.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "paeio")]
#[command(about = "Read and write Azure storage with automatic credential resolution")]
#[command(version)]
pub struct Cli {
    /// Credential resolution configuration.
    #[clap(flatten)]
    pub resolver: ResolverConfig,

    /// Storage account, container and upload configuration.
    #[clap(flatten)]
    pub storage: StorageConfig,

    /// Log format on stderr.
    #[arg(long, env = "PAEIO_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Loads the `.env` file (if enabled) and parses arguments.
    ///
    /// The file is loaded first so clap can fall back to its values.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing on stderr with `RUST_LOG` filtering, `warn` by default.
    ///
    /// Stdout is reserved for command output.
    pub fn init_tracing(&self) -> anyhow::Result<()> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let registry = tracing_subscriber::registry().with(filter);

        let result = match self.log_format {
            LogFormat::Text => registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init(),
            LogFormat::Json => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init(),
        };

        result.map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.resolver
            .validate()
            .context("invalid credential configuration")?;
        self.storage
            .validate()
            .context("invalid storage configuration")?;
        Ok(())
    }

    /// Logs configuration at debug level (no secrets).
    pub fn log(&self) {
        Self::log_build_info();

        tracing::debug!(
            target: TRACING_TARGET_CONFIG,
            project_root = %self.resolver.project_root.display(),
            credentials_file = %self.resolver.credentials_path().display(),
            non_interactive = self.resolver.non_interactive,
            interactive_timeout_secs = self.resolver.interactive_timeout().as_secs(),
            token_cache = self.resolver.token_cache_path().is_some(),
            "Credential configuration"
        );

        tracing::debug!(
            target: TRACING_TARGET_CONFIG,
            account = ?self.storage.account,
            container = ?self.storage.container,
            endpoint = ?self.storage.endpoint,
            upload_mode = %self.storage.upload_mode,
            chunk_size = self.storage.chunk_size(),
            "Storage configuration"
        );
    }

    fn log_build_info() {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );
    }

    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}
