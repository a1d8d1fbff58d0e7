//! Subcommands and their execution against a [`StorageGateway`].

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;
use paeio_storage::{Payload, StorageGateway};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::TRACING_TARGET_COMMAND;

/// Path meaning stdin or stdout.
const STDIO: &str = "-";

/// Storage operations exposed on the command line.
///
/// Paths are either keys in the default container or Azure URIs
/// (`az://`, `abfss://`, `https://`).
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Resolve a credential and print which strategy produced it.
    Resolve,

    /// Download an object.
    Read {
        /// Object key or URI.
        path: String,
        /// Destination file, `-` for stdout.
        #[arg(short, long, default_value = STDIO)]
        output: PathBuf,
        /// Shared access signature; skips credential resolution.
        #[arg(long, env = "PAEIO_SAS_TOKEN", hide_env_values = true)]
        sas: Option<String>,
    },

    /// Upload an object, replacing any existing one.
    Write {
        /// Object key or URI.
        path: String,
        /// Source file, `-` for stdin.
        #[arg(short, long, default_value = STDIO)]
        input: PathBuf,
        /// Content-type stored with the object.
        #[arg(long)]
        content_type: Option<String>,
    },

    /// List objects under a prefix.
    Ls {
        /// Key prefix or URI.
        #[arg(default_value = "")]
        prefix: String,
        /// Print one JSON object per entry.
        #[arg(long)]
        json: bool,
    },

    /// List keys matching a glob pattern.
    Glob {
        /// Pattern such as `raw/**/*.csv`.
        pattern: String,
    },

    /// Print the last key matching a glob pattern.
    Latest {
        /// Pattern such as `history/stock_*.parquet`.
        pattern: String,
    },

    /// Check whether an object exists; exits with an error when it does not.
    Exists {
        /// Object key or URI.
        path: String,
    },

    /// Delete an object.
    Rm {
        /// Object key or URI.
        path: String,
    },

    /// Move an object within one container.
    Mv {
        /// Current key or URI.
        from: String,
        /// New key or URI.
        to: String,
    },

    /// Forget the active credential and clear the token cache.
    Logout,
}

impl Command {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::Ls { .. } => "ls",
            Self::Glob { .. } => "glob",
            Self::Latest { .. } => "latest",
            Self::Exists { .. } => "exists",
            Self::Rm { .. } => "rm",
            Self::Mv { .. } => "mv",
            Self::Logout => "logout",
        }
    }

    /// Runs the command, writing results to stdout.
    pub async fn execute(&self, gateway: &StorageGateway) -> anyhow::Result<()> {
        tracing::debug!(
            target: TRACING_TARGET_COMMAND,
            command = self.name(),
            "Executing command"
        );

        match self {
            Self::Resolve => resolve(gateway).await,
            Self::Read { path, output, sas } => {
                read(gateway, path, output, sas.as_deref()).await
            }
            Self::Write {
                path,
                input,
                content_type,
            } => write(gateway, path, input, content_type.as_deref()).await,
            Self::Ls { prefix, json } => list(gateway, prefix, *json).await,
            Self::Glob { pattern } => {
                let keys = gateway
                    .glob(pattern)
                    .await
                    .with_context(|| format!("failed to match '{pattern}'"))?;
                print_lines(keys).await
            }
            Self::Latest { pattern } => {
                let latest = gateway
                    .latest(pattern)
                    .await
                    .with_context(|| format!("failed to match '{pattern}'"))?
                    .with_context(|| format!("nothing matches '{pattern}'"))?;
                print_lines([latest]).await
            }
            Self::Exists { path } => {
                let found = gateway
                    .exists(path)
                    .await
                    .with_context(|| format!("failed to check '{path}'"))?;
                anyhow::ensure!(found, "'{path}' does not exist");
                Ok(())
            }
            Self::Rm { path } => gateway
                .delete(path)
                .await
                .with_context(|| format!("failed to delete '{path}'")),
            Self::Mv { from, to } => gateway
                .rename(from, to)
                .await
                .with_context(|| format!("failed to move '{from}' to '{to}'")),
            Self::Logout => {
                gateway.logout().await.context("failed to log out")?;
                eprintln!("Logged out.");
                Ok(())
            }
        }
    }
}

async fn resolve(gateway: &StorageGateway) -> anyhow::Result<()> {
    let credential = gateway
        .credential()
        .await
        .context("failed to resolve credentials")?;

    print_lines([
        format!("strategy: {}", credential.strategy()),
        format!("expires_on: {}", credential.expires_on()),
    ])
    .await
}

async fn read(
    gateway: &StorageGateway,
    path: &str,
    output: &Path,
    sas: Option<&str>,
) -> anyhow::Result<()> {
    let payload = match sas {
        Some(sas) => gateway.read_url(path, sas).await,
        None => gateway.read(path).await,
    }
    .with_context(|| format!("failed to read '{path}'"))?;

    if output.as_os_str() == STDIO {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(payload.bytes()).await?;
        stdout.flush().await?;
    } else {
        tokio::fs::write(output, payload.bytes())
            .await
            .with_context(|| format!("failed to write '{}'", output.display()))?;
    }

    tracing::info!(
        target: TRACING_TARGET_COMMAND,
        path = %path,
        size = payload.len(),
        "Object downloaded"
    );
    Ok(())
}

async fn write(
    gateway: &StorageGateway,
    path: &str,
    input: &Path,
    content_type: Option<&str>,
) -> anyhow::Result<()> {
    let data = if input.as_os_str() == STDIO {
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        buf
    } else {
        tokio::fs::read(input)
            .await
            .with_context(|| format!("failed to read '{}'", input.display()))?
    };

    let mut payload = Payload::new(data);
    if let Some(content_type) = content_type {
        payload = payload.with_content_type(content_type);
    }

    let ack = gateway
        .write(path, payload)
        .await
        .with_context(|| format!("failed to write '{path}'"))?;

    tracing::info!(
        target: TRACING_TARGET_COMMAND,
        path = %ack.path,
        size = ack.size,
        mode = %ack.mode,
        e_tag = ?ack.e_tag,
        "Object uploaded"
    );
    Ok(())
}

async fn list(gateway: &StorageGateway, prefix: &str, json: bool) -> anyhow::Result<()> {
    let objects = gateway
        .list(prefix)
        .await
        .with_context(|| format!("failed to list '{prefix}'"))?;

    let lines = objects
        .iter()
        .map(|object| {
            if json {
                serde_json::to_string(object).context("failed to serialize listing")
            } else {
                Ok(format!("{:>12}  {}", object.size, object.key))
            }
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    print_lines(lines).await
}

async fn print_lines(lines: impl IntoIterator<Item = String>) -> anyhow::Result<()> {
    let mut out = String::new();
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }

    let mut stdout = tokio::io::stdout();
    stdout.write_all(out.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}
