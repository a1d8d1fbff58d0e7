#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for strategy selection and credential lifecycle events.
///
/// Partial configuration diagnostics are emitted on this target at warn level.
pub const TRACING_TARGET_RESOLVER: &str = "paeio_credential::resolver";

/// Tracing target for identity provider calls (client secret and device code grants).
pub const TRACING_TARGET_AUTHENTICATOR: &str = "paeio_credential::authenticator";

/// Tracing target for the interactive token cache.
pub const TRACING_TARGET_TOKEN_CACHE: &str = "paeio_credential::token_cache";

mod authenticator;
mod config;
mod credentials_file;
mod environment;
mod error;
mod resolver;
mod strategy;
mod token;
mod token_cache;

#[cfg(any(test, feature = "mock"))]
#[cfg_attr(docsrs, doc(cfg(feature = "mock")))]
pub mod mock;

#[doc(hidden)]
pub mod prelude;

pub use authenticator::{
    AadAuthenticator, AuthError, Authenticator, DeviceCodeNotifier, DeviceCodePrompt,
    DeviceCodeRequest, StderrNotifier,
};
pub use config::{ResolveOverrides, ResolverConfig};
pub use environment::{Environment, ProcessEnvironment, StaticEnvironment};
pub use error::{Error, Result};
pub use resolver::CredentialResolver;
pub use strategy::{
    CredentialStrategy, InteractiveSettings, PartialConfiguration, Selection, ServicePrincipal,
    StrategyKind, select_strategy,
};
pub use token::{AccessToken, ResolvedCredential};
pub use token_cache::TokenCache;

/// Environment variable holding the service principal client id.
pub const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";

/// Environment variable holding the service principal client secret.
pub const AZURE_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";

/// Environment variable holding the Azure AD tenant id.
pub const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";

/// OAuth scope requested for every storage token.
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";
