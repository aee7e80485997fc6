//! Tool configuration
//!
//! Every setting has a default, so an empty JSON object is a valid
//! configuration. [`ToolConfig::validate`] runs once at startup.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dates::DateLocale;
use crate::error::ConfigError;

/// Backend names understood by the selector, in the default priority order
pub const DEFAULT_BACKEND_ORDER: [&str; 5] = [
    "vector-pdf",
    "dom-canvas",
    "dom-snapshot",
    "template-raster",
    "synthetic-canvas",
];

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Laboratory name used in messages and the text certificate
    #[serde(default = "default_lab_name")]
    pub lab_name: String,
    #[serde(default)]
    pub locale: DateLocale,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub handoff: HandoffConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

fn default_lab_name() -> String {
    "LabMetal".to_string()
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            lab_name: default_lab_name(),
            locale: DateLocale::default(),
            messaging: MessagingConfig::default(),
            render: RenderConfig::default(),
            handoff: HandoffConfig::default(),
            directory: DirectoryConfig::default(),
        }
    }
}

impl ToolConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ToolConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.render.validate()?;
        if self.messaging.country_prefix.is_empty()
            || !self.messaging.country_prefix.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ConfigError::ParseError(format!(
                "country prefix '{}' must be digits",
                self.messaging.country_prefix
            )));
        }
        Ok(())
    }
}

/// Messaging deep-link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Country calling code applied to local numbers (default: "51")
    #[serde(default = "default_country_prefix")]
    pub country_prefix: String,
}

fn default_base_url() -> String {
    "https://wa.me".to_string()
}

fn default_country_prefix() -> String {
    "51".to_string()
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            country_prefix: default_country_prefix(),
        }
    }
}

/// Encoding for raster artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    #[default]
    Png,
    Jpeg,
}

/// Coarse device capability hint.
///
/// Adjusts backend parameters only. The set and order of backends tried
/// is the same on every device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    #[default]
    Desktop,
    Constrained,
}

impl DeviceClass {
    const MOBILE_MARKERS: [&'static str; 7] = [
        "Android",
        "iPhone",
        "iPad",
        "iPod",
        "BlackBerry",
        "IEMobile",
        "Opera Mini",
    ];

    pub fn from_user_agent(user_agent: &str) -> Self {
        if Self::MOBILE_MARKERS
            .iter()
            .any(|marker| user_agent.contains(marker))
        {
            DeviceClass::Constrained
        } else {
            DeviceClass::Desktop
        }
    }
}

/// Per-device backend parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Raster scale factor relative to CSS pixels
    pub scale: f32,
    /// Lossy compression quality in (0, 1]
    pub quality: f32,
    /// Multiplier applied to every backend timeout
    #[serde(default = "default_timeout_factor")]
    pub timeout_factor: f32,
}

fn default_timeout_factor() -> f32 {
    1.0
}

fn default_desktop() -> DeviceProfile {
    DeviceProfile {
        scale: 2.0,
        quality: 0.95,
        timeout_factor: 1.0,
    }
}

fn default_constrained() -> DeviceProfile {
    DeviceProfile {
        scale: 1.0,
        quality: 0.9,
        timeout_factor: 1.0,
    }
}

/// Bounded retry for backends whose dependency is still loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Probe attempts per backend, including the first (default: 8)
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Wait before the second probe (default: 700 ms)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Backoff ceiling (default: 4000 ms)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_attempts() -> u32 {
    8
}

fn default_initial_delay_ms() -> u64 {
    700
}

fn default_max_delay_ms() -> u64 {
    4000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given zero-based failed probe: doubles, then caps
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Render Strategy Selector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Backends in priority order
    #[serde(default = "default_backend_order")]
    pub backend_order: Vec<String>,
    #[serde(default)]
    pub probe_retry: RetryPolicy,
    /// Wait after forcing a zero-size target visible (default: 300 ms)
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Per-attempt timeout for backends without an override (default: 15 s)
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Per-backend timeout overrides, by backend name
    #[serde(default)]
    pub timeouts_ms: BTreeMap<String, u64>,
    #[serde(default)]
    pub raster_format: RasterFormat,
    #[serde(default = "default_desktop")]
    pub desktop: DeviceProfile,
    #[serde(default = "default_constrained")]
    pub constrained: DeviceProfile,
}

fn default_backend_order() -> Vec<String> {
    DEFAULT_BACKEND_ORDER.iter().map(|s| s.to_string()).collect()
}

fn default_settle_delay_ms() -> u64 {
    300
}

fn default_timeout_ms() -> u64 {
    15_000
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            backend_order: default_backend_order(),
            probe_retry: RetryPolicy::default(),
            settle_delay_ms: default_settle_delay_ms(),
            default_timeout_ms: default_timeout_ms(),
            timeouts_ms: BTreeMap::new(),
            raster_format: RasterFormat::default(),
            desktop: default_desktop(),
            constrained: default_constrained(),
        }
    }
}

impl RenderConfig {
    pub fn profile(&self, device: DeviceClass) -> &DeviceProfile {
        match device {
            DeviceClass::Desktop => &self.desktop,
            DeviceClass::Constrained => &self.constrained,
        }
    }

    /// Attempt timeout for one backend on one device class
    pub fn timeout_for(&self, backend: &str, device: DeviceClass) -> Duration {
        let base = self
            .timeouts_ms
            .get(backend)
            .copied()
            .unwrap_or(self.default_timeout_ms);
        let factor = self.profile(device).timeout_factor.max(0.0) as f64;
        Duration::from_millis((base as f64 * factor).round() as u64)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_order.is_empty() {
            return Err(ConfigError::InvalidRender(
                "backend order is empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for name in &self.backend_order {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::InvalidRender(format!(
                    "backend '{}' listed twice",
                    name
                )));
            }
        }
        if self.probe_retry.attempts == 0 {
            return Err(ConfigError::InvalidRender(
                "probe_retry.attempts must be at least 1".to_string(),
            ));
        }
        for (label, profile) in [("desktop", &self.desktop), ("constrained", &self.constrained)] {
            if !(profile.scale > 0.0) {
                return Err(ConfigError::InvalidRender(format!(
                    "{} scale must be positive",
                    label
                )));
            }
            if !(profile.quality > 0.0 && profile.quality <= 1.0) {
                return Err(ConfigError::InvalidRender(format!(
                    "{} quality must be in (0, 1]",
                    label
                )));
            }
            if !(profile.timeout_factor > 0.0) {
                return Err(ConfigError::InvalidRender(format!(
                    "{} timeout_factor must be positive",
                    label
                )));
            }
        }
        Ok(())
    }
}

/// Export/Handoff timings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// Release the artifact's handles this long after hand-off (default: 10 min)
    #[serde(default = "default_release_delay_ms")]
    pub release_delay_ms: u64,
    /// Pause between starting the download and opening the deep link
    #[serde(default = "default_link_delay_ms")]
    pub link_delay_ms: u64,
}

fn default_release_delay_ms() -> u64 {
    600_000
}

fn default_link_delay_ms() -> u64 {
    1000
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            release_delay_ms: default_release_delay_ms(),
            link_delay_ms: default_link_delay_ms(),
        }
    }
}

impl HandoffConfig {
    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.release_delay_ms)
    }

    pub fn link_delay(&self) -> Duration {
        Duration::from_millis(self.link_delay_ms)
    }
}

/// Where the client directory comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_directory_url")]
    pub url: String,
    #[serde(default = "default_max_matches")]
    pub max_matches: usize,
}

fn default_directory_url() -> String {
    "./clientes.json".to_string()
}

fn default_max_matches() -> usize {
    10
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: default_directory_url(),
            max_matches: default_max_matches(),
        }
    }
}
