//! Connection settings for a router.

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

pub const ENV_ADDRESS: &str = "ROUTER_ADDRESS";
pub const ENV_USERNAME: &str = "ROUTER_USERNAME";
pub const ENV_PASSWORD: &str = "ROUTER_PASSWORD";

/// Where the router lives and how to log in.
///
/// `address` includes the scheme, e.g. `https://192.168.1.1`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouterConfig {
    pub address: String,
    pub username: String,
    pub password: String,
}

impl RouterConfig {
    pub fn new(address: &str, username: &str, password: &str) -> Self {
        Self {
            address: address.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Read `ROUTER_ADDRESS`, `ROUTER_USERNAME` and `ROUTER_PASSWORD`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ApiError::Config(format!("{key} is not set")))
        };
        Ok(Self {
            address: get(ENV_ADDRESS)?,
            username: get(ENV_USERNAME)?,
            password: get(ENV_PASSWORD)?,
        })
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
