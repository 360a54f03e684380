//! Declarative configuration loading from TOML.
//!
//! [`FileConfig`] mirrors [`StreamConfig`] with serde-friendly types and converts into
//! it through the builder, so file values get the same validation as programmatic ones.
//!
//! # Example TOML
//!
//! ```toml
//! protocol-version = 2
//! strict-class-names = false
//! serial-filter = "maxdepth=32;maxarray=100000;!com.evil.*"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, StreamConfig, StreamConfigBuilder};

/// File-based stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileConfig {
    /// Protocol version for externalizable data, `1` or `2`.
    pub protocol_version: Option<u32>,
    /// Require stream class names to equal local names exactly.
    pub strict_class_names: Option<bool>,
    /// Serial filter pattern applied to every reader.
    pub serial_filter: Option<String>,
}

impl TryFrom<FileConfig> for StreamConfig {
    type Error = ConfigError;

    fn try_from(file: FileConfig) -> Result<Self, Self::Error> {
        let mut builder = StreamConfigBuilder::new();
        if let Some(version) = file.protocol_version {
            builder = builder.protocol_number(version);
        }
        if let Some(strict) = file.strict_class_names {
            builder = builder.strict_class_names(strict);
        }
        if let Some(pattern) = file.serial_filter {
            if !pattern.trim().is_empty() {
                builder = builder.serial_filter(pattern);
            }
        }
        builder.build()
    }
}

impl StreamConfig {
    /// Parses configuration from a TOML string.
    ///
    /// Requires the `config-file` feature.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file_config: FileConfig = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("failed to parse TOML config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from a TOML file.
    ///
    /// Requires the `config-file` feature.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let config = StreamConfig::from_toml_file("objstream.toml")?;
    /// let writer = ObjectWriter::with_config(Vec::new(), &config)?;
    /// ```
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("failed to read TOML config file: {e}")))?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtocolVersion;

    #[test]
    fn test_file_config_defaults_produce_default_stream_config() {
        let config: StreamConfig = FileConfig::default().try_into().unwrap();
        assert_eq!(config.protocol_version(), ProtocolVersion::V2);
        assert!(!config.strict_class_names());
        assert!(config.serial_filter().is_none());
    }

    #[test]
    fn test_from_toml_str() {
        let config = StreamConfig::from_toml_str(
            r#"
            protocol-version = 1
            strict-class-names = true
            serial-filter = "maxdepth=4;!com.evil.*"
            "#,
        )
        .unwrap();
        assert_eq!(config.protocol_version(), ProtocolVersion::V1);
        assert!(config.strict_class_names());
        assert_eq!(
            config.serial_filter().map(|f| f.source()),
            Some("maxdepth=4;!com.evil.*")
        );
    }

    #[test]
    fn test_blank_filter_is_ignored() {
        let config = StreamConfig::from_toml_str("serial-filter = \"  \"").unwrap();
        assert!(config.serial_filter().is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = StreamConfig::from_toml_str("protocol-version = 7").unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: unknown protocol version: 7"
        );
        assert!(StreamConfig::from_toml_str("serial-filter = \"maxrefs=many\"").is_err());
        assert!(StreamConfig::from_toml_str("protocol-version = \"two\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = StreamConfig::from_toml_file("/nonexistent/objstream.toml").unwrap_err();
        assert!(err.to_string().contains("failed to read TOML config file"));
    }

    #[test]
    fn test_toml_round_trip() {
        let file_config = FileConfig {
            protocol_version: Some(2),
            serial_filter: Some("maxarray=10".to_string()),
            ..Default::default()
        };
        let toml_str = toml::to_string(&file_config).unwrap();
        let parsed: FileConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, file_config);
    }
}
