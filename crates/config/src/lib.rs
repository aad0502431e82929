//! Environment-driven configuration for the bridge process.
//!
//! Every knob comes from the process environment so the daemon can run
//! unchanged under a container orchestrator. `Settings::from_env` never
//! touches the filesystem; validation that can abort startup lives in
//! [`Settings::validate`].

use std::path::PathBuf;

use thiserror::Error;

/// Default HTTP listen port.
pub const DEFAULT_API_PORT: u16 = 8080;

/// Default base URL advertised for media downloads in webhook payloads.
/// Deployment-local by nature; override with `DOWNLOAD_URL_BASE`.
pub const DEFAULT_DOWNLOAD_URL_BASE: &str = "http://localhost:8080/api/download";

/// Default sidecar endpoint speaking the platform wire protocol.
pub const DEFAULT_SIDECAR_URL: &str = "ws://127.0.0.1:3620/ws";

/// Filesystem roots from which outbound media may be read.
pub const DEFAULT_MEDIA_ROOTS: [&str; 3] = ["/app/media", "/app/store", "/tmp"];

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("API_KEY is required unless DISABLE_AUTH_CHECK=true")]
    MissingApiKey,
}

/// Resolved process configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// HTTP listen port (`API_PORT`).
    pub api_port: u16,
    /// Shared secret compared against the `X-API-Key` header (`API_KEY`).
    pub api_key: Option<String>,
    /// Development bypass for API authentication (`DISABLE_AUTH_CHECK`).
    pub disable_auth_check: bool,
    /// Skip the SSRF filter on webhook targets (`DISABLE_SSRF_CHECK`).
    pub disable_ssrf_check: bool,
    /// Skip the media-path allow-list (`DISABLE_PATH_CHECK`). The traversal
    /// guard still runs with this set.
    pub disable_path_check: bool,
    /// Additional allowed CORS origins (`CORS_ORIGINS`, comma-separated).
    pub cors_origins: Vec<String>,
    /// History backfill window in days (`HISTORY_SYNC_DAYS_LIMIT`).
    pub history_sync_days_limit: Option<u32>,
    /// History backfill size cap in MiB (`HISTORY_SYNC_SIZE_MB`).
    pub history_sync_size_mb: Option<u32>,
    /// Platform session storage quota in MiB (`STORAGE_QUOTA_MB`).
    pub storage_quota_mb: Option<u32>,
    /// Base URL for the media download endpoint (`DOWNLOAD_URL_BASE`).
    pub download_url_base: String,
    /// WebSocket endpoint of the platform sidecar (`SIDECAR_URL`).
    pub sidecar_url: String,
    /// Directory holding the embedded store files (`STORE_DIR`).
    pub store_dir: PathBuf,
    /// Roots from which outbound media may be read.
    pub media_allowed_roots: Vec<PathBuf>,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary lookup function. Lets tests supply
    /// values without mutating process state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            api_port: parse_or("API_PORT", &lookup, DEFAULT_API_PORT)?,
            api_key: lookup("API_KEY").filter(|v| !v.is_empty()),
            disable_auth_check: flag("DISABLE_AUTH_CHECK", &lookup),
            disable_ssrf_check: flag("DISABLE_SSRF_CHECK", &lookup),
            disable_path_check: flag("DISABLE_PATH_CHECK", &lookup),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            history_sync_days_limit: parse_opt("HISTORY_SYNC_DAYS_LIMIT", &lookup)?,
            history_sync_size_mb: parse_opt("HISTORY_SYNC_SIZE_MB", &lookup)?,
            storage_quota_mb: parse_opt("STORAGE_QUOTA_MB", &lookup)?,
            download_url_base: lookup("DOWNLOAD_URL_BASE")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_DOWNLOAD_URL_BASE.to_string()),
            sidecar_url: lookup("SIDECAR_URL")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_SIDECAR_URL.to_string()),
            store_dir: lookup("STORE_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("store")),
            media_allowed_roots: DEFAULT_MEDIA_ROOTS.iter().map(PathBuf::from).collect(),
        })
    }

    /// Startup validation. A failure here must abort the process.
    pub fn validate(&self) -> Result<()> {
        if !self.disable_auth_check && self.api_key.is_none() {
            return Err(Error::MissingApiKey);
        }
        Ok(())
    }
}

fn flag(name: &str, lookup: &impl Fn(&str) -> Option<String>) -> bool {
    lookup(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T> {
    match lookup(name) {
        Some(value) if !value.is_empty() => value
            .parse()
            .map_err(|_| Error::InvalidValue { name, value }),
        _ => Ok(default),
    }
}

fn parse_opt<T: std::str::FromStr>(
    name: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<T>> {
    match lookup(name) {
        Some(value) if !value.is_empty() => value
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidValue { name, value }),
        _ => Ok(None),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.api_port, DEFAULT_API_PORT);
        assert!(settings.api_key.is_none());
        assert!(!settings.disable_auth_check);
        assert_eq!(settings.download_url_base, DEFAULT_DOWNLOAD_URL_BASE);
        assert_eq!(settings.store_dir, PathBuf::from("store"));
        assert_eq!(settings.media_allowed_roots.len(), 3);
    }

    #[test]
    fn validate_requires_api_key() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert!(matches!(settings.validate(), Err(Error::MissingApiKey)));
    }

    #[test]
    fn auth_bypass_waives_api_key() {
        let settings =
            Settings::from_lookup(lookup_from(&[("DISABLE_AUTH_CHECK", "true")])).unwrap();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = Settings::from_lookup(lookup_from(&[("API_PORT", "not-a-port")])).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { name: "API_PORT", .. }));
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let settings = Settings::from_lookup(lookup_from(&[(
            "CORS_ORIGINS",
            "https://a.example, https://b.example ,",
        )]))
        .unwrap();
        assert_eq!(
            settings.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn history_limits_parse() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("HISTORY_SYNC_DAYS_LIMIT", "30"),
            ("HISTORY_SYNC_SIZE_MB", "512"),
            ("STORAGE_QUOTA_MB", "2048"),
        ]))
        .unwrap();
        assert_eq!(settings.history_sync_days_limit, Some(30));
        assert_eq!(settings.history_sync_size_mb, Some(512));
        assert_eq!(settings.storage_quota_mb, Some(2048));
    }

    #[test]
    fn flag_accepts_common_truthy_spellings() {
        for spelling in ["true", "TRUE", "1", "yes"] {
            let settings =
                Settings::from_lookup(lookup_from(&[("DISABLE_SSRF_CHECK", spelling)])).unwrap();
            assert!(settings.disable_ssrf_check, "spelling: {spelling}");
        }
        let settings =
            Settings::from_lookup(lookup_from(&[("DISABLE_SSRF_CHECK", "false")])).unwrap();
        assert!(!settings.disable_ssrf_check);
    }
}
