#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod command;
mod config;
mod signal;

use std::process;
use std::sync::Arc;

use anyhow::Context;
use paeio_credential::{AadAuthenticator, CredentialResolver};
use paeio_storage::{StorageError, StorageGateway};

use crate::config::Cli;

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "paeio_cli::startup";
pub const TRACING_TARGET_SHUTDOWN: &str = "paeio_cli::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "paeio_cli::config";
pub const TRACING_TARGET_COMMAND: &str = "paeio_cli::command";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        process::exit(0);
    };

    tracing::debug!(
        target: TRACING_TARGET_SHUTDOWN,
        error = ?error,
        "Command failed"
    );

    match error.downcast_ref::<StorageError>() {
        Some(storage) => eprintln!("Error: {}", storage.user_message()),
        None => match error.downcast_ref::<paeio_credential::Error>() {
            Some(credential) => eprintln!("Error: {}", credential.user_message()),
            None => eprintln!("Error: {error:#}"),
        },
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();
    cli.init_tracing()?;
    cli.log();
    cli.validate()?;

    let authenticator =
        AadAuthenticator::new(&cli.resolver).context("failed to create identity client")?;
    let resolver = Arc::new(CredentialResolver::new(
        cli.resolver.clone(),
        Arc::new(authenticator),
    ));
    let gateway = StorageGateway::azure(Arc::clone(&resolver), cli.storage.clone())
        .context("failed to create storage gateway")?;

    let cancel = resolver.cancellation_token();
    tokio::select! {
        result = cli.command.execute(&gateway) => result,
        () = signal::interrupted() => {
            cancel.cancel();
            anyhow::bail!("interrupted")
        }
    }
}
