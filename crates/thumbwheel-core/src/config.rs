use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub scroll: ScrollConfig,
    #[serde(default)]
    pub click: ClickConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level used when neither RUST_LOG nor DEBUG is set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Input event device to read; auto-discovered when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Directory scanned during auto-discovery
    #[serde(default = "default_search_dir")]
    pub search_dir: PathBuf,
    /// File name suffix identifying a pointer event device
    #[serde(default = "default_device_suffix")]
    pub suffix: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: None,
            search_dir: default_search_dir(),
            suffix: default_device_suffix(),
        }
    }
}

/// Scroll tuning knobs
///
/// The defaults are hand-tuned values carried over unchanged; they are
/// exposed here so they can be adjusted without rebuilding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollConfig {
    /// Cadence of the periodic driver while a session is active
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Delay before repeat-fire begins, so a quick tap stays a single click
    #[serde(default = "default_warmup")]
    pub warmup_ms: u64,
    /// A session starting within this window after the previous one ended is accelerated
    #[serde(default = "default_acceleration_window")]
    pub acceleration_window_ms: u64,
    /// Upper bound of the move counter
    #[serde(default = "default_max_moves")]
    pub max_moves: u32,
    /// Clicks per turn in an accelerated session before tier bonuses
    #[serde(default = "default_accelerated_base_clicks")]
    pub accelerated_base_clicks: u32,
    /// Move-count tiers; every tier whose threshold is exceeded adds its bonus
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierConfig>,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            warmup_ms: default_warmup(),
            acceleration_window_ms: default_acceleration_window(),
            max_moves: default_max_moves(),
            accelerated_base_clicks: default_accelerated_base_clicks(),
            tiers: default_tiers(),
        }
    }
}

impl ScrollConfig {
    #[inline]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[inline]
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    #[inline]
    pub fn acceleration_window(&self) -> Duration {
        Duration::from_millis(self.acceleration_window_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Bonus applies when the move counter is strictly greater than this
    pub above: u32,
    /// Extra clicks per turn
    pub extra: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickConfig {
    /// Program invoked as `<command> click <button>`
    #[serde(default = "default_click_command")]
    pub command: String,
    /// X11 button number for wheel up
    #[serde(default = "default_wheel_up_button")]
    pub up_button: u8,
    /// X11 button number for wheel down
    #[serde(default = "default_wheel_down_button")]
    pub down_button: u8,
    /// Log clicks instead of performing them
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            command: default_click_command(),
            up_button: default_wheel_up_button(),
            down_button: default_wheel_down_button(),
            dry_run: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_search_dir() -> PathBuf {
    PathBuf::from("/dev/input/by-id")
}

fn default_device_suffix() -> String {
    "-event-mouse".to_string()
}

fn default_tick_interval() -> u64 {
    100
}

fn default_warmup() -> u64 {
    256
}

fn default_acceleration_window() -> u64 {
    300
}

fn default_max_moves() -> u32 {
    1000
}

fn default_accelerated_base_clicks() -> u32 {
    2
}

fn default_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig { above: 200, extra: 1 },
        TierConfig { above: 500, extra: 2 },
        TierConfig { above: 1000, extra: 3 },
    ]
}

fn default_click_command() -> String {
    "xdotool".to_string()
}

fn default_wheel_up_button() -> u8 {
    4
}

fn default_wheel_down_button() -> u8 {
    5
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from the default location or return defaults
    pub fn load() -> crate::Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(expand_tilde(path))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration file path
    /// Always uses ~/.config/thumbwheel/config.toml
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("thumbwheel")
            .join("config.toml")
    }

    /// Configured device path (with tilde expansion)
    pub fn device_path(&self) -> Option<PathBuf> {
        self.device.path.as_deref().map(expand_tilde)
    }

    pub fn validate(&self) -> crate::Result<()> {
        let scroll = &self.scroll;
        if scroll.tick_interval_ms == 0 {
            return Err(crate::Error::Config(
                "scroll.tick_interval_ms must be greater than 0".to_string(),
            ));
        }
        if scroll.max_moves == 0 {
            return Err(crate::Error::Config(
                "scroll.max_moves must be greater than 0".to_string(),
            ));
        }
        if scroll.tiers.windows(2).any(|w| w[0].above >= w[1].above) {
            return Err(crate::Error::Config(
                "scroll.tiers thresholds must be strictly ascending".to_string(),
            ));
        }
        Ok(())
    }
}
