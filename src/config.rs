// Connection parameters for the hosted table

use crate::error::{CacheError, Result};

pub const URL_VAR: &str = "SUPABASE_URL";
pub const KEY_VAR: &str = "SUPABASE_ANON_KEY";

/// Endpoint and access key for the hosted buyer table
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    pub access_key: String,
}

impl RemoteConfig {
    /// Build from explicit values, rejecting blanks
    pub fn new(url: Option<String>, access_key: Option<String>) -> Result<Self> {
        let url = url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        let access_key = access_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());

        match (url, access_key) {
            (Some(url), Some(access_key)) => Ok(Self { url, access_key }),
            (None, _) => Err(CacheError::Configuration(format!("{} must be provided", URL_VAR))),
            (_, None) => Err(CacheError::Configuration(format!("{} must be provided", KEY_VAR))),
        }
    }

    /// Read `SUPABASE_URL` and `SUPABASE_ANON_KEY` from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::new(lookup(URL_VAR), lookup(KEY_VAR))
    }
}

// Keep the key out of logs
impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("access_key", &"<redacted>")
            .finish()
    }
}
