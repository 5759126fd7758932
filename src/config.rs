use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CamwatchConfig {
    pub agent: AgentConfig,
    pub collector: CollectorConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AgentConfig {
    /// Absolute URL of the remote collector site
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Seconds between scheduled upload attempts
    #[serde(default = "default_upload_interval")]
    pub upload_interval_seconds: u64,

    /// Motion score threshold above which a frame becomes upload evidence
    #[serde(default = "default_motion_threshold")]
    pub motion_threshold: f64,

    /// Per-pixel difference threshold for the frame differencer
    #[serde(default = "default_difference_threshold")]
    pub difference_threshold: u32,

    /// Minimum accepted blob width in pixels
    #[serde(default = "default_min_blob_size")]
    pub min_blob_width: u32,

    /// Minimum accepted blob height in pixels
    #[serde(default = "default_min_blob_size")]
    pub min_blob_height: u32,

    /// JPEG quality for the upload payload (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Capacity of the acquisition-to-classifier frame channel
    #[serde(default = "default_frame_channel_capacity")]
    pub frame_channel_capacity: usize,

    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CollectorConfig {
    /// IP address to bind to
    #[serde(default = "default_collector_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_collector_port")]
    pub port: u16,

    /// Directory where uploaded images are persisted
    #[serde(default = "default_data_path")]
    pub data_path: String,

    /// Upload cadence advertised to agents, in seconds
    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: u64,

    /// Enable the visible UTC timestamp overlay on stored images
    #[serde(default = "default_timestamp_overlay")]
    pub timestamp_overlay: bool,

    /// Path to TrueType font file for the timestamp overlay
    #[serde(default = "default_timestamp_font_path")]
    pub timestamp_font_path: String,

    /// Font size for the timestamp overlay
    #[serde(default = "default_timestamp_font_size")]
    pub timestamp_font_size: f32,

    /// JPEG quality for stored images (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl CamwatchConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("camwatch.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("agent.site_url", default_site_url())?
            .set_default(
                "agent.upload_interval_seconds",
                default_upload_interval() as i64,
            )?
            .set_default("agent.motion_threshold", default_motion_threshold())?
            .set_default(
                "agent.difference_threshold",
                default_difference_threshold() as i64,
            )?
            .set_default("agent.min_blob_width", default_min_blob_size() as i64)?
            .set_default("agent.min_blob_height", default_min_blob_size() as i64)?
            .set_default("agent.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default(
                "agent.frame_channel_capacity",
                default_frame_channel_capacity() as i64,
            )?
            .set_default(
                "agent.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("collector.ip", default_collector_ip())?
            .set_default("collector.port", default_collector_port() as i64)?
            .set_default("collector.data_path", default_data_path())?
            .set_default(
                "collector.duration_seconds",
                default_duration_seconds() as i64,
            )?
            .set_default(
                "collector.timestamp_overlay",
                default_timestamp_overlay(),
            )?
            .set_default(
                "collector.timestamp_font_path",
                default_timestamp_font_path(),
            )?
            .set_default(
                "collector.timestamp_font_size",
                default_timestamp_font_size() as f64,
            )?
            .set_default("collector.jpeg_quality", default_jpeg_quality() as i64)?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with CAMWATCH_ prefix
            .add_source(Environment::with_prefix("CAMWATCH").separator("_"))
            .build()?;

        let config: CamwatchConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Write the configuration back to disk in TOML format.
    ///
    /// The agent persists a server-advertised `Duration` change (and the
    /// confirmed destination URL) through this call.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> crate::error::Result<()> {
        let rendered = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), rendered)?;
        info!("Configuration saved to: {}", path.as_ref().display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.upload_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Agent upload_interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.agent.motion_threshold <= 0.0 {
            return Err(ConfigError::Message(
                "Agent motion_threshold must be greater than 0".to_string(),
            ));
        }

        if self.agent.jpeg_quality == 0 || self.agent.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Agent jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.agent.min_blob_width == 0 || self.agent.min_blob_height == 0 {
            return Err(ConfigError::Message(
                "Agent minimum blob dimensions must be greater than 0".to_string(),
            ));
        }

        if self.agent.frame_channel_capacity == 0 {
            return Err(ConfigError::Message(
                "Agent frame_channel_capacity must be greater than 0".to_string(),
            ));
        }

        if self.agent.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Agent event_bus_capacity must be greater than 0".to_string(),
            ));
        }

        if self.collector.duration_seconds == 0 {
            return Err(ConfigError::Message(
                "Collector duration_seconds must be greater than 0".to_string(),
            ));
        }

        if self.collector.jpeg_quality == 0 || self.collector.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Collector jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        Ok(())
    }
}

impl AgentConfig {
    /// Scheduler period derived from the configured seconds
    pub fn upload_interval(&self) -> Duration {
        Duration::from_secs(self.upload_interval_seconds)
    }
}

impl Default for CamwatchConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig {
                site_url: default_site_url(),
                upload_interval_seconds: default_upload_interval(),
                motion_threshold: default_motion_threshold(),
                difference_threshold: default_difference_threshold(),
                min_blob_width: default_min_blob_size(),
                min_blob_height: default_min_blob_size(),
                jpeg_quality: default_jpeg_quality(),
                frame_channel_capacity: default_frame_channel_capacity(),
                event_bus_capacity: default_event_bus_capacity(),
            },
            collector: CollectorConfig {
                ip: default_collector_ip(),
                port: default_collector_port(),
                data_path: default_data_path(),
                duration_seconds: default_duration_seconds(),
                timestamp_overlay: default_timestamp_overlay(),
                timestamp_font_path: default_timestamp_font_path(),
                timestamp_font_size: default_timestamp_font_size(),
                jpeg_quality: default_jpeg_quality(),
            },
        }
    }
}

// Default value functions
fn default_site_url() -> String {
    "http://localhost:8081".to_string()
}
fn default_upload_interval() -> u64 {
    15
}
fn default_motion_threshold() -> f64 {
    0.005
}
fn default_difference_threshold() -> u32 {
    15
}
fn default_min_blob_size() -> u32 {
    10
}
fn default_jpeg_quality() -> u8 {
    70
}
fn default_frame_channel_capacity() -> usize {
    8
}
fn default_event_bus_capacity() -> usize {
    100
}

fn default_collector_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_collector_port() -> u16 {
    8081
}
fn default_data_path() -> String {
    "./Datas".to_string()
}
fn default_duration_seconds() -> u64 {
    15
}
fn default_timestamp_overlay() -> bool {
    true
}
fn default_timestamp_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}
fn default_timestamp_font_size() -> f32 {
    20.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CamwatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.upload_interval(), Duration::from_secs(15));
        assert_eq!(config.agent.motion_threshold, 0.005);
        assert_eq!(config.agent.min_blob_width, 10);
        assert_eq!(config.collector.duration_seconds, 15);
    }

    #[test]
    fn test_config_validation() {
        let mut config = CamwatchConfig::default();

        config.agent.upload_interval_seconds = 0;
        assert!(config.validate().is_err());
        config.agent.upload_interval_seconds = 15;
        assert!(config.validate().is_ok());

        config.agent.jpeg_quality = 101;
        assert!(config.validate().is_err());
        config.agent.jpeg_quality = 70;

        config.collector.duration_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camwatch.toml");

        let mut config = CamwatchConfig::default();
        config.agent.upload_interval_seconds = 30;
        config.agent.site_url = "http://collector.example.com".to_string();
        config.save_to_file(&path).unwrap();

        let reloaded = CamwatchConfig::load_from_file(&path).unwrap();
        assert_eq!(reloaded.agent.upload_interval_seconds, 30);
        assert_eq!(reloaded.agent.site_url, "http://collector.example.com");
    }
}
