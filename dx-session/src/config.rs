//! Client configuration.
//!
//! Environment variables:
//!   DX_API_ADDRESS    - Peer base URL (required by `from_env`)
//!   DX_PREKEY_PATH    - Prekey endpoint (default: /self/prekey)
//!   DX_LOGIN_PATH     - Login endpoint (default: /self/login)
//!   DX_TIMEOUT_SECS   - Per-request timeout (default: 30)

use std::time::Duration;

pub const DEFAULT_PREKEY_PATH: &str = "/self/prekey";
pub const DEFAULT_LOGIN_PATH: &str = "/self/login";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub prekey_path: String,
    pub login_path: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            prekey_path: DEFAULT_PREKEY_PATH.into(),
            login_path: DEFAULT_LOGIN_PATH.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read the `DX_*` variables. Returns `None` when `DX_API_ADDRESS` is unset.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let mut config = Self::new(get("DX_API_ADDRESS")?);
        if let Some(path) = get("DX_PREKEY_PATH") {
            config.prekey_path = path;
        }
        if let Some(path) = get("DX_LOGIN_PATH") {
            config.login_path = path;
        }
        if let Some(secs) = get("DX_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.timeout = Duration::from_secs(secs);
        }
        Some(config)
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let c = ClientConfig::new("http://localhost:3000/");
        assert_eq!(c.base_url, "http://localhost:3000");
        assert_eq!(c.prekey_path, "/self/prekey");
        assert_eq!(c.login_path, "/self/login");
        assert_eq!(c.timeout, Duration::from_secs(30));
        assert_eq!(c.url("/e2ee/echo"), "http://localhost:3000/e2ee/echo");
        assert_eq!(c.url("health"), "http://localhost:3000/health");
    }

    #[test]
    fn lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DX_API_ADDRESS", "https://api.example.test"),
            ("DX_PREKEY_PATH", "/v2/prekey"),
            ("DX_TIMEOUT_SECS", "5"),
        ]
        .into_iter()
        .collect();
        let c = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.prekey_path, "/v2/prekey");
        assert_eq!(c.login_path, DEFAULT_LOGIN_PATH);
        assert_eq!(c.timeout, Duration::from_secs(5));
    }

    #[test]
    fn address_required() {
        assert!(ClientConfig::from_lookup(|_| None).is_none());
    }
}
