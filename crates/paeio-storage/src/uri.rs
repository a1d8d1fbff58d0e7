//! Azure storage URIs.
//!
//! Accepted forms:
//!
//! - `abfs[s]://<container>@<account>.dfs.core.windows.net/<path>`
//! - `https://<account>.blob.core.windows.net/<container>/<path>`
//! - `https://<account>.dfs.core.windows.net/<container>/<path>`
//! - `az://<container>/<path>` (account taken from configuration)

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::{Result, StorageError};

static HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<account>[a-z0-9]{3,24})\.(?P<service>blob|dfs)\.core\.windows\.net$")
        .unwrap_or_else(|e| unreachable!("host pattern is valid: {e}"))
});

/// Storage service an URI addresses.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceKind {
    /// Blob service (`*.blob.core.windows.net`).
    #[default]
    Blob,
    /// Data Lake Gen2 service (`*.dfs.core.windows.net`).
    #[strum(to_string = "dfs", serialize = "gen2")]
    #[serde(rename = "dfs", alias = "gen2")]
    Dfs,
}

/// Parsed Azure storage location of a single object or prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AzureUri {
    /// Storage account, absent for `az://` URIs.
    pub account: Option<String>,
    /// Container (file system for Data Lake).
    pub container: String,
    /// Object key within the container, without a leading slash.
    pub path: String,
    /// Service the URI was written for.
    pub service: ServiceKind,
}

impl AzureUri {
    /// Parses `uri`, failing with [`StorageError::InvalidPath`].
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = |reason: &str| StorageError::invalid_path(uri, reason);

        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;

        let parsed = match scheme.to_ascii_lowercase().as_str() {
            "abfs" | "abfss" => {
                let (authority, path) = split_authority(rest);
                let (container, host) = authority
                    .split_once('@')
                    .ok_or_else(|| invalid("expected container@account host"))?;
                let (account, _) = parse_host(host).ok_or_else(|| invalid("unrecognized host"))?;

                Self {
                    account: Some(account),
                    container: container.to_owned(),
                    path: path.to_owned(),
                    service: ServiceKind::Dfs,
                }
            }
            "https" | "http" => {
                let (host, path) = split_authority(rest);
                let (account, service) =
                    parse_host(host).ok_or_else(|| invalid("unrecognized host"))?;
                let (container, path) = split_authority(path);

                Self {
                    account: Some(account),
                    container: container.to_owned(),
                    path: path.to_owned(),
                    service,
                }
            }
            "az" => {
                let (container, path) = split_authority(rest);
                Self {
                    account: None,
                    container: container.to_owned(),
                    path: path.to_owned(),
                    service: ServiceKind::Blob,
                }
            }
            other => return Err(invalid(&format!("unsupported scheme '{other}'"))),
        };

        if parsed.container.is_empty() {
            return Err(invalid("missing container"));
        }

        Ok(parsed)
    }

    /// Whether `path` looks like an URI rather than a plain key.
    pub fn is_uri(path: &str) -> bool {
        path.contains("://")
    }

    /// Returns the same container with another object path.
    #[must_use]
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }
}

fn split_authority(rest: &str) -> (&str, &str) {
    let rest = rest.trim_start_matches('/');
    match rest.split_once('/') {
        Some((head, tail)) => (head, tail.trim_start_matches('/')),
        None => (rest, ""),
    }
}

fn parse_host(host: &str) -> Option<(String, ServiceKind)> {
    let host = host.to_ascii_lowercase();
    let captures = HOST.captures(&host)?;
    let service = match &captures["service"] {
        "dfs" => ServiceKind::Dfs,
        _ => ServiceKind::Blob,
    };
    Some((captures["account"].to_owned(), service))
}

impl FromStr for AzureUri {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for AzureUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.account {
            Some(account) => write!(
                f,
                "https://{account}.{}.core.windows.net/{}/{}",
                self.service, self.container, self.path
            ),
            None => write!(f, "az://{}/{}", self.container, self.path),
        }
    }
}
