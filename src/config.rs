use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 300;
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_UPLOAD_REQUEST_MB: usize = 512;

/// Runtime settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base address of the document service, without a trailing slash.
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub upload_timeout: Duration,
    pub port: u16,
    pub max_upload_request_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            upload_timeout: Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
            port: DEFAULT_PORT,
            max_upload_request_bytes: DEFAULT_MAX_UPLOAD_REQUEST_MB * 1024 * 1024,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let api_base_url = lookup("DOC_SERVICE_BASE_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.api_base_url);

        let request_timeout = match parse_var::<u64>(&lookup, "DOC_SERVICE_TIMEOUT_SECS")? {
            Some(secs) => Duration::from_secs(secs),
            None => defaults.request_timeout,
        };
        let upload_timeout = match parse_var::<u64>(&lookup, "DOC_SERVICE_UPLOAD_TIMEOUT_SECS")? {
            Some(secs) => Duration::from_secs(secs),
            None => defaults.upload_timeout,
        };
        let port = parse_var::<u16>(&lookup, "PORT")?.unwrap_or(defaults.port);
        let max_upload_request_bytes = parse_var::<usize>(&lookup, "MAX_UPLOAD_REQUEST_MB")?
            .map(|mb| mb * 1024 * 1024)
            .unwrap_or(defaults.max_upload_request_bytes);

        Ok(Self {
            api_base_url,
            request_timeout,
            upload_timeout,
            port,
            max_upload_request_bytes,
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{key} must be a number, got '{raw}'"))
        })
        .transpose()
}
