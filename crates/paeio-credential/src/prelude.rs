//! Convenience re-exports.

pub use crate::authenticator::{AadAuthenticator, Authenticator, DeviceCodeNotifier};
pub use crate::config::{ResolveOverrides, ResolverConfig};
pub use crate::environment::{Environment, ProcessEnvironment};
pub use crate::error::{Error, Result};
pub use crate::resolver::CredentialResolver;
pub use crate::strategy::StrategyKind;
pub use crate::token::ResolvedCredential;
