//! Configuration parsing, TOML or JSON

use contracts::{ContractError, VisionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Format from a file extension, case-insensitive
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn parse_toml(content: &str) -> Result<VisionConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse_json(content: &str) -> Result<VisionConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<VisionConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Channel, LogLevel, SinkType};

    #[test]
    fn test_parse_toml_sections() {
        let content = r#"
metrics_port = 9100

[backend]
serials = ["AB12", "CD34"]
frame_rate_hz = 15.0
never_deliver = ["infrared"]

[devices]
select = [1]

[streaming]
channels = ["color", "depth"]
frame_timeout_ms = 500
max_frames = 10

[logging]
level = "warning"
format = "json"

[[sinks]]
name = "screen"
sink_type = "mosaic"
"#;
        let config = parse_toml(content).unwrap();
        assert_eq!(config.backend.serials, vec!["AB12", "CD34"]);
        assert!(config.backend.never_deliver.contains(Channel::Infrared));
        assert_eq!(config.devices.select, vec![1]);
        assert_eq!(config.streaming.channels.len(), 2);
        assert_eq!(config.streaming.frame_timeout_ms, 500);
        assert_eq!(config.logging.level, LogLevel::Warning);
        assert_eq!(config.sinks[0].sink_type, SinkType::Mosaic);
        assert_eq!(config.sinks[0].queue_capacity, 8);
        assert_eq!(config.metrics_port, Some(9100));
    }

    #[test]
    fn test_parse_json_defaults() {
        let config = parse_json(r#"{ "streaming": { "max_frames": 3 } }"#).unwrap();
        assert_eq!(config.streaming.max_frames, 3);
        assert_eq!(config.streaming.frame_timeout_ms, 10_000);
        assert_eq!(config.display.width, 640);
        assert_eq!(config.sinks.len(), 1);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let err = parse_toml("invalid toml [[[").unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_channel_rejected() {
        let err = parse_toml("[streaming]\nchannels = [\"thermal\"]\n").unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
