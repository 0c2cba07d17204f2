//! # Config Loader
//!
//! Loads and validates a [`VisionConfig`].
//!
//! Responsibilities:
//! - Parse TOML / JSON configuration files
//! - Field and cross-field validation
//! - Serialize back for `validate --json` style output
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("vision.toml")).unwrap();
//! println!("timeout: {} ms", config.streaming.frame_timeout_ms);
//! ```

mod parser;
mod validator;

pub use contracts::VisionConfig;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a file, format taken from the extension (`.toml` / `.json`)
    ///
    /// # Errors
    /// Unreadable file, unsupported extension, parse or validation failure.
    pub fn load_from_path(path: &Path) -> Result<VisionConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<VisionConfig, ContractError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }

    /// Validate a config built in code (defaults or CLI overrides)
    pub fn validate(config: &VisionConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    pub fn to_toml(config: &VisionConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(config: &VisionConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }

    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Status;

    const SAMPLE_TOML: &str = r#"
[backend]
serials = ["AB12", "CD34"]

[streaming]
channels = ["color", "depth", "infrared"]
frame_timeout_ms = 2000

[display]
width = 320
height = 240

[[sinks]]
name = "log"
sink_type = "log"

[[sinks]]
name = "screen"
sink_type = "mosaic"
queue_capacity = 2
"#;

    #[test]
    fn test_load_from_str_toml() {
        let config = ConfigLoader::load_from_str(SAMPLE_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(config.backend.serials.len(), 2);
        assert_eq!(config.display.width, 320);
        assert_eq!(config.sinks.len(), 2);
    }

    #[test]
    fn test_toml_json_agree() {
        let config = ConfigLoader::load_from_str(SAMPLE_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&config).unwrap();
        let from_json = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(from_json.streaming.frame_timeout_ms, 2000);
        assert_eq!(from_json.streaming.channels, config.streaming.channels);

        let toml = ConfigLoader::to_toml(&from_json).unwrap();
        let again = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(again.sinks[1].queue_capacity, 2);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = "[backend]\nserials = [\"AB12\", \"AB12\"]\n";
        let err = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap_err();
        assert_eq!(err.status(), Status::Error);
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = ConfigLoader::load_from_path(Path::new("vision.yaml")).unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }
}
