//! Node configuration
//!
//! `NodeConfig::default()` carries the field defaults. A deployment file is
//! a JSON object with any subset of the fields; durations are written the
//! humantime way (`"60s"`, `"5000ms"`, `"1m"`). The authority host and
//! secret may also come from `KEYWARD_HOST` / `KEYWARD_SECRET`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{ContactPolarity, DeviceMode, KeywardError, KeywardResult};

/// Cap on the cached authorized-tag set
pub const DEFAULT_MAX_CACHED_TAGS: usize = 200;

/// Consecutive check-in failures before offline fallback
pub const DEFAULT_OFFLINE_AFTER_FAILURES: u32 = 3;

pub const ENV_HOST: &str = "KEYWARD_HOST";
pub const ENV_SECRET: &str = "KEYWARD_SECRET";

/// Node configuration
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Name used in logs
    pub device_name: String,
    /// Device class, selects the tag-read strategy
    pub mode: DeviceMode,
    /// Authority base URL, e.g. `https://portal.example.org`
    pub host: String,
    /// Shared device secret sent with every request
    pub secret: String,
    /// Period of the standard check-in
    pub checkin_interval: Duration,
    /// Period of the interlock session heartbeat
    pub session_heartbeat_interval: Duration,
    /// Reads ignored for this long after a swipe has been handled
    pub squelch: Duration,
    /// A partial reader frame older than this is discarded
    pub read_timeout: Duration,
    /// How long a door pulse holds the contact
    pub pulse_dwell: Duration,
    /// How long the denied signal is held
    pub denied_hold: Duration,
    /// Pacing delay before and after every request
    pub pacing: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
    pub offline_after_failures: u32,
    pub max_cached_tags: usize,
    /// Persisted authorized-tag snapshot
    pub cache_path: PathBuf,
    pub contact_polarity: ContactPolarity,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            device_name: "keyward".to_string(),
            mode: DeviceMode::Door,
            host: String::new(),
            secret: String::new(),
            checkin_interval: Duration::from_secs(60),
            session_heartbeat_interval: Duration::from_secs(60),
            squelch: Duration::from_millis(5000),
            read_timeout: Duration::from_millis(500),
            pulse_dwell: Duration::from_secs(5),
            denied_hold: Duration::from_secs(1),
            pacing: Duration::from_millis(10),
            request_timeout: Duration::from_secs(10),
            offline_after_failures: DEFAULT_OFFLINE_AFTER_FAILURES,
            max_cached_tags: DEFAULT_MAX_CACHED_TAGS,
            cache_path: PathBuf::from("authorised.json"),
            contact_polarity: ContactPolarity::ActiveHigh,
        }
    }
}

/// On-disk shape of the configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    device_name: Option<String>,
    mode: Option<DeviceMode>,
    host: Option<String>,
    secret: Option<String>,
    checkin_interval: Option<String>,
    session_heartbeat_interval: Option<String>,
    squelch: Option<String>,
    read_timeout: Option<String>,
    pulse_dwell: Option<String>,
    denied_hold: Option<String>,
    pacing: Option<String>,
    request_timeout: Option<String>,
    offline_after_failures: Option<u32>,
    max_cached_tags: Option<usize>,
    cache_path: Option<PathBuf>,
    contact_polarity: Option<ContactPolarity>,
}

impl NodeConfig {
    /// Parse a JSON configuration document over the defaults
    pub fn from_json_str(json: &str) -> KeywardResult<Self> {
        let file: ConfigFile = serde_json::from_str(json)
            .map_err(|e| KeywardError::InvalidConfig(e.to_string()))?;

        let mut config = NodeConfig::default();
        if let Some(v) = file.device_name {
            config.device_name = v;
        }
        if let Some(v) = file.mode {
            config.mode = v;
        }
        if let Some(v) = file.host {
            config.host = v;
        }
        if let Some(v) = file.secret {
            config.secret = v;
        }
        set_duration(&mut config.checkin_interval, "checkin_interval", file.checkin_interval)?;
        set_duration(
            &mut config.session_heartbeat_interval,
            "session_heartbeat_interval",
            file.session_heartbeat_interval,
        )?;
        set_duration(&mut config.squelch, "squelch", file.squelch)?;
        set_duration(&mut config.read_timeout, "read_timeout", file.read_timeout)?;
        set_duration(&mut config.pulse_dwell, "pulse_dwell", file.pulse_dwell)?;
        set_duration(&mut config.denied_hold, "denied_hold", file.denied_hold)?;
        set_duration(&mut config.pacing, "pacing", file.pacing)?;
        set_duration(&mut config.request_timeout, "request_timeout", file.request_timeout)?;
        if let Some(v) = file.offline_after_failures {
            config.offline_after_failures = v;
        }
        if let Some(v) = file.max_cached_tags {
            config.max_cached_tags = v;
        }
        if let Some(v) = file.cache_path {
            config.cache_path = v;
        }
        if let Some(v) = file.contact_polarity {
            config.contact_polarity = v;
        }
        Ok(config)
    }

    /// Read a configuration file, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> KeywardResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            KeywardError::InvalidConfig(format!("{}: {e}", path.display()))
        })?;
        let mut config = Self::from_json_str(&json)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override host and secret from an environment lookup
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup(ENV_HOST).filter(|v| !v.is_empty()) {
            self.host = host;
        }
        if let Some(secret) = lookup(ENV_SECRET).filter(|v| !v.is_empty()) {
            self.secret = secret;
        }
    }

    pub fn validate(&self) -> KeywardResult<()> {
        if !(self.host.starts_with("https://") || self.host.starts_with("http://")) {
            return Err(KeywardError::InvalidConfig(format!(
                "host must be an http(s) URL, got {:?}",
                self.host
            )));
        }
        if self.secret.is_empty() {
            return Err(KeywardError::InvalidConfig("secret is empty".into()));
        }
        if self.checkin_interval.is_zero() || self.session_heartbeat_interval.is_zero() {
            return Err(KeywardError::InvalidConfig(
                "timer intervals must be non-zero".into(),
            ));
        }
        if self.max_cached_tags == 0 {
            return Err(KeywardError::InvalidConfig(
                "max_cached_tags must be at least 1".into(),
            ));
        }
        if self.offline_after_failures == 0 {
            return Err(KeywardError::InvalidConfig(
                "offline_after_failures must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Host without a trailing slash, ready for path joins
    pub fn base_url(&self) -> &str {
        self.host.trim_end_matches('/')
    }
}

fn set_duration(slot: &mut Duration, field: &str, value: Option<String>) -> KeywardResult<()> {
    if let Some(raw) = value {
        *slot = humantime::parse_duration(&raw)
            .map_err(|e| KeywardError::InvalidConfig(format!("{field}: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn configured() -> NodeConfig {
        NodeConfig {
            host: "https://portal.example.org/".into(),
            secret: "s3cret".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.checkin_interval, Duration::from_secs(60));
        assert_eq!(config.session_heartbeat_interval, Duration::from_secs(60));
        assert_eq!(config.squelch, Duration::from_millis(5000));
        assert_eq!(config.read_timeout, Duration::from_millis(500));
        assert_eq!(config.max_cached_tags, 200);
        assert_eq!(config.offline_after_failures, 3);
    }

    #[test]
    fn test_json_overrides_defaults() {
        let config = NodeConfig::from_json_str(
            r#"{
                "mode": "interlock",
                "host": "https://portal.example.org",
                "secret": "abc",
                "checkin_interval": "30s",
                "squelch": "2500ms",
                "read_timeout": "250ms",
                "contact_polarity": "active_low"
            }"#,
        )
        .unwrap();

        assert_eq!(config.mode, DeviceMode::Interlock);
        assert_eq!(config.checkin_interval, Duration::from_secs(30));
        assert_eq!(config.squelch, Duration::from_millis(2500));
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.contact_polarity, ContactPolarity::ActiveLow);
        assert_eq!(config.pulse_dwell, Duration::from_secs(5));
        config.validate().unwrap();
    }

    #[test]
    fn test_bad_duration_rejected() {
        let err = NodeConfig::from_json_str(r#"{"squelch": "soon"}"#).unwrap_err();
        assert!(matches!(err, KeywardError::InvalidConfig(msg) if msg.starts_with("squelch")));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(NodeConfig::from_json_str(r#"{"colour": "blue"}"#).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = NodeConfig::default();
        config.apply_env(|key| match key {
            ENV_HOST => Some("https://auth.local".to_string()),
            ENV_SECRET => Some("from-env".to_string()),
            _ => None,
        });
        assert_eq!(config.host, "https://auth.local");
        assert_eq!(config.secret, "from-env");
        config.validate().unwrap();
    }

    #[test]
    fn test_validation() {
        assert!(NodeConfig::default().validate().is_err());

        let mut config = configured();
        config.validate().unwrap();

        config.max_cached_tags = 0;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.checkin_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.host = "portal.example.org".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_url_trims_slash() {
        assert_eq!(configured().base_url(), "https://portal.example.org");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"host": "http://10.0.0.2:8000", "secret": "x", "mode": "keylocker"}}"#
        )
        .unwrap();

        let config = NodeConfig::load(file.path()).unwrap();
        assert_eq!(config.mode, DeviceMode::KeyLocker);
    }
}
