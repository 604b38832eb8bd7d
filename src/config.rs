use std::env;
use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_YLE_API_BASE: &str = "https://external.api.yle.fi/";
const DEFAULT_YLE_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_UPLOAD_URL_TTL_SECONDS: u64 = 6 * 60;

/// Returns the value of the named environment variable if it exists or panics.
pub fn get_variable(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("must define {} environment variable", name))
}

/// Parses the named environment variable, falling back to `default` when
/// it is unset. Panics if it is set but unparseable.
pub fn get_variable_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Debug,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .unwrap_or_else(|e| panic!("parse {} environment variable: {:?}", name, e)),
        Err(_) => default,
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YLE decryption key must be 16, 24 or 32 bytes, not {0}")]
    InvalidKeyLength(usize),

    #[error("YLE API base URL {0} cannot have paths appended")]
    InvalidApiBase(Url),
}

/// Credentials and endpoints for the YLE media provider.
#[derive(Clone)]
pub struct YleConfig {
    api_base: Url,
    pub(crate) app_id: String,
    pub(crate) app_key: String,
    pub(crate) decryption_key: Vec<u8>,
    pub timeout: Duration,
}

impl YleConfig {
    pub fn new(
        api_base: Url,
        app_id: impl Into<String>,
        app_key: impl Into<String>,
        decryption_key: impl Into<Vec<u8>>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let decryption_key = decryption_key.into();

        match decryption_key.len() {
            16 | 24 | 32 => {}
            n => return Err(ConfigError::InvalidKeyLength(n)),
        }

        if api_base.cannot_be_a_base() {
            return Err(ConfigError::InvalidApiBase(api_base));
        }

        // relative joins only keep the last path segment with a trailing slash
        let mut api_base = api_base;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        Ok(YleConfig {
            api_base,
            app_id: app_id.into(),
            app_key: app_key.into(),
            decryption_key,
            timeout,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base = get_variable_or(
            "YLE_API_BASE_URL",
            Url::parse(DEFAULT_YLE_API_BASE).expect("parse default YLE API base URL"),
        );

        YleConfig::new(
            api_base,
            get_variable("YLE_CLIENT_ID"),
            get_variable("YLE_CLIENT_KEY"),
            get_variable("YLE_DECRYPT").into_bytes(),
            Duration::from_secs(get_variable_or(
                "YLE_TIMEOUT_SECONDS",
                DEFAULT_YLE_TIMEOUT_SECONDS,
            )),
        )
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }
}

impl Debug for YleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YleConfig")
            .field("api_base", &self.api_base.as_str())
            .field("app_id", &self.app_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// How long signed upload URLs stay valid.
#[derive(Clone, Copy, Debug)]
pub struct UploadPolicy {
    pub url_ttl: Duration,
}

impl UploadPolicy {
    pub fn from_env() -> Self {
        UploadPolicy {
            url_ttl: Duration::from_secs(get_variable_or(
                "BACKEND_UPLOAD_URL_TTL_SECONDS",
                DEFAULT_UPLOAD_URL_TTL_SECONDS,
            )),
        }
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        UploadPolicy {
            url_ttl: Duration::from_secs(DEFAULT_UPLOAD_URL_TTL_SECONDS),
        }
    }
}

/// Size limits applied to uploaded files after they land in the store.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GuardPolicy {
    pub min_audio_bytes: u64,
    pub max_audio_bytes: u64,
    pub max_metadata_bytes: u64,
    /// How much of the file header to read for type detection.
    pub sniff_bytes: u64,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        GuardPolicy {
            min_audio_bytes: 10_000,
            max_audio_bytes: 500_000_000,
            max_metadata_bytes: 100_000,
            sniff_bytes: 128,
        }
    }
}

impl GuardPolicy {
    pub fn from_env() -> Self {
        let default = GuardPolicy::default();

        GuardPolicy {
            min_audio_bytes: get_variable_or("GUARD_MIN_AUDIO_BYTES", default.min_audio_bytes),
            max_audio_bytes: get_variable_or("GUARD_MAX_AUDIO_BYTES", default.max_audio_bytes),
            max_metadata_bytes: get_variable_or(
                "GUARD_MAX_METADATA_BYTES",
                default.max_metadata_bytes,
            ),
            sniff_bytes: get_variable_or("GUARD_SNIFF_BYTES", default.sniff_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use url::Url;

    use super::{ConfigError, YleConfig};

    #[test]
    fn yle_key_length_is_checked() {
        let base = Url::parse("https://api.example.com").unwrap();

        for len in &[16, 24, 32] {
            assert!(YleConfig::new(base.clone(), "id", "key", vec![0u8; *len], Duration::from_secs(1)).is_ok());
        }

        assert!(matches!(
            YleConfig::new(base, "id", "key", vec![0u8; 15], Duration::from_secs(1)),
            Err(ConfigError::InvalidKeyLength(15))
        ));
    }

    #[test]
    fn yle_base_gains_trailing_slash() {
        let base = Url::parse("https://api.example.com/proxy").unwrap();
        let config = YleConfig::new(base, "id", "key", vec![0u8; 16], Duration::from_secs(1)).unwrap();

        assert_eq!(config.api_base().as_str(), "https://api.example.com/proxy/");
    }
}
