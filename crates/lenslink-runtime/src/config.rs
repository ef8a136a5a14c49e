//! Client configuration – reads/writes `~/.lenslink/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lenslink_perception::{PositionMode, Vec3};
use lenslink_types::{LinkError, PayloadEncoding};
use serde::{Deserialize, Serialize};

/// Lowest accepted capture rate (one frame every 100 s).
pub const MIN_CAPTURE_HZ: f64 = 0.01;

/// Highest accepted capture rate.
pub const MAX_CAPTURE_HZ: f64 = 240.0;

/// Persisted client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Remote endpoint, `ws://host:port`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Frame capture rate in Hz.
    #[serde(default = "default_capture_hz")]
    pub capture_hz: f64,

    /// JPEG quality, 0–100.
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Outbound frame framing.
    #[serde(default)]
    pub payload: PayloadEncoding,

    /// Delay before the first capture tick.
    #[serde(default)]
    pub start_delay_ms: u64,

    /// When set, pose messages never move the sink away from this point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<[f32; 3]>,
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:9002".to_string()
}
fn default_capture_hz() -> f64 {
    30.0
}
fn default_quality() -> u8 {
    80
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            capture_hz: default_capture_hz(),
            quality: default_quality(),
            payload: PayloadEncoding::default(),
            start_delay_ms: 0,
            anchor: None,
        }
    }
}

impl ClientConfig {
    /// Interval between capture ticks.  Only meaningful after
    /// [`validate`][Self::validate] succeeded.
    pub fn capture_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.capture_hz)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn position_mode(&self) -> PositionMode {
        match self.anchor {
            Some([x, y, z]) => PositionMode::Anchored(Vec3::new(x, y, z)),
            None => PositionMode::Tracked,
        }
    }

    /// Check every field is usable.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), LinkError> {
        let host = self.endpoint.strip_prefix("ws://").ok_or_else(|| {
            LinkError::Config(format!(
                "endpoint '{}' must use the ws:// scheme",
                self.endpoint
            ))
        })?;
        if host.is_empty() {
            return Err(LinkError::Config(format!(
                "endpoint '{}' has no host",
                self.endpoint
            )));
        }
        if !(MIN_CAPTURE_HZ..=MAX_CAPTURE_HZ).contains(&self.capture_hz) {
            return Err(LinkError::Config(format!(
                "capture_hz must be in [{MIN_CAPTURE_HZ}, {MAX_CAPTURE_HZ}], got {}",
                self.capture_hz
            )));
        }
        if self.quality > 100 {
            return Err(LinkError::Config(format!(
                "quality must be in [0, 100], got {}",
                self.quality
            )));
        }
        if let Some(anchor) = self.anchor
            && anchor.iter().any(|v| !v.is_finite())
        {
            return Err(LinkError::Config("anchor must be finite".to_string()));
        }
        Ok(())
    }
}

/// Return the path to `~/.lenslink/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".lenslink").join("config.toml")
}

/// Load the config from the default path.  `None` if the file does not
/// exist.
pub fn load() -> Result<Option<ClientConfig>, LinkError> {
    load_from(&config_path())
}

/// Load the config from `path` and apply environment overrides.
pub fn load_from(path: &Path) -> Result<Option<ClientConfig>, LinkError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        LinkError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: ClientConfig =
        toml::from_str(&raw).map_err(|e| LinkError::Config(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `LENSLINK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `LENSLINK_ENDPOINT` | `endpoint` |
/// | `LENSLINK_CAPTURE_HZ` | `capture_hz` |
/// | `LENSLINK_QUALITY` | `quality` |
/// | `LENSLINK_PAYLOAD` | `payload` (`binary` or `text-base64`) |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut ClientConfig) {
    if let Ok(v) = std::env::var("LENSLINK_ENDPOINT") {
        cfg.endpoint = v;
    }
    if let Ok(v) = std::env::var("LENSLINK_CAPTURE_HZ")
        && let Ok(hz) = v.parse::<f64>()
    {
        cfg.capture_hz = hz;
    }
    if let Ok(v) = std::env::var("LENSLINK_QUALITY")
        && let Ok(q) = v.parse::<u8>()
    {
        cfg.quality = q;
    }
    if let Ok(v) = std::env::var("LENSLINK_PAYLOAD") {
        match v.as_str() {
            "binary" => cfg.payload = PayloadEncoding::Binary,
            "text-base64" => cfg.payload = PayloadEncoding::TextBase64,
            _ => {}
        }
    }
}

/// Save the config to the default path, creating `~/.lenslink/` if needed.
pub fn save(cfg: &ClientConfig) -> Result<(), LinkError> {
    save_to(cfg, &config_path())
}

/// Save the config to `path`, owner-only on Unix.
pub fn save_to(cfg: &ClientConfig, path: &Path) -> Result<(), LinkError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| LinkError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                LinkError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| LinkError::Config(format!("failed to serialize config: {e}")))?;
    let write_err =
        |e: std::io::Error| LinkError::Config(format!("failed to write config at {}: {e}", path.display()));
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}
