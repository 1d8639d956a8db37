use std::env;
use std::time::Duration;

use kernel::Credentials;

use crate::error::{Error, Result};

pub const STORAGE_URI_VAR: &str = "METARK_STORAGE_URI";
pub const API_KEY_VAR: &str = "METARK_API_KEY";
pub const ACCOUNT_VAR: &str = "METARK_ACCOUNT";
pub const META_SERVER_VAR: &str = "METARK_META_SERVER";
pub const META_KEY_VAR: &str = "METARK_META_KEY";
pub const META_TOKEN_VAR: &str = "METARK_META_TOKEN";
pub const TIMEOUT_VAR: &str = "METARK_TIMEOUT_SECS";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Storage service connection settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub uri: String,
    pub api_key: String,
    pub account_hint: String,
    pub timeout: Duration,
}

impl StorageConfig {
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials {
            api_key: self.api_key.clone(),
            account: self.account_hint.clone(),
        }
    }
}

/// Metadata archive connection settings.
#[derive(Debug, Clone)]
pub struct MetaConf {
    pub key: String,
    pub token: String,
    pub server_address: String,
    pub timeout: Duration,
}

/// Everything a workflow run needs to reach both services.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub storage: StorageConfig,
    pub archive: MetaConf,
}

impl WorkflowConfig {
    /// Reads the configuration from `METARK_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns a variable's value if set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Configuration(format!("{name} must be set")))
        };

        let timeout = match lookup(TIMEOUT_VAR) {
            Some(value) => value.parse::<u64>().map_err(|e| {
                Error::Configuration(format!("parsing {TIMEOUT_VAR} value `{value}`: {e}"))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        let timeout = Duration::from_secs(timeout);

        Ok(Self {
            storage: StorageConfig {
                uri: required(STORAGE_URI_VAR)?,
                api_key: required(API_KEY_VAR)?,
                account_hint: lookup(ACCOUNT_VAR).unwrap_or_default(),
                timeout,
            },
            archive: MetaConf {
                key: required(META_KEY_VAR)?,
                token: required(META_TOKEN_VAR)?,
                server_address: required(META_SERVER_VAR)?,
                timeout,
            },
        })
    }

    /// Reads the environment, letting command line addresses take precedence.
    pub fn from_env_and_args(storage_uri: Option<&str>, meta_server: Option<&str>) -> Result<Self> {
        Self::from_lookup(overlay(
            |name| env::var(name).ok(),
            storage_uri,
            meta_server,
        ))
    }
}

fn overlay<'a, F>(
    lookup: F,
    storage_uri: Option<&'a str>,
    meta_server: Option<&'a str>,
) -> impl Fn(&str) -> Option<String> + 'a
where
    F: Fn(&str) -> Option<String> + 'a,
{
    move |name| {
        let arg = match name {
            STORAGE_URI_VAR => storage_uri,
            META_SERVER_VAR => meta_server,
            _ => None,
        };
        arg.map(str::to_owned).or_else(|| lookup(name))
    }
}
