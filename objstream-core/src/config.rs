//! Stream configuration types and builders.

use std::sync::Arc;

use crate::protocol::ProtocolVersion;
use crate::serialization::filter::{ObjectInputFilter, PatternFilter};

/// Environment variable selecting the protocol version (`1` or `2`).
pub const ENV_PROTOCOL_VERSION: &str = "OBJSTREAM_PROTOCOL_VERSION";
/// Environment variable enabling exact class name matching.
pub const ENV_STRICT_CLASS_NAMES: &str = "OBJSTREAM_STRICT_CLASS_NAMES";
/// Environment variable holding a serial filter pattern.
pub const ENV_SERIAL_FILTER: &str = "OBJSTREAM_SERIAL_FILTER";

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Settings shared by writers and readers.
#[derive(Clone, Default)]
pub struct StreamConfig {
    protocol_version: ProtocolVersion,
    strict_class_names: bool,
    serial_filter: Option<PatternFilter>,
}

impl std::fmt::Debug for StreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConfig")
            .field("protocol_version", &self.protocol_version)
            .field("strict_class_names", &self.strict_class_names)
            .field(
                "serial_filter",
                &self.serial_filter.as_ref().map(PatternFilter::source),
            )
            .finish()
    }
}

impl StreamConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::new()
    }

    /// Protocol version used for externalizable data on write.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// Whether stream class names must equal local names exactly.
    ///
    /// When false, only the part after the last `.` is compared.
    pub fn strict_class_names(&self) -> bool {
        self.strict_class_names
    }

    /// The configured pattern filter, if any.
    pub fn serial_filter(&self) -> Option<&PatternFilter> {
        self.serial_filter.as_ref()
    }

    pub(crate) fn filter_handle(&self) -> Option<Arc<dyn ObjectInputFilter>> {
        self.serial_filter
            .clone()
            .map(|f| Arc::new(f) as Arc<dyn ObjectInputFilter>)
    }

    /// Loads configuration from environment variables.
    ///
    /// | Variable | Maps to |
    /// |----------|---------|
    /// | `OBJSTREAM_PROTOCOL_VERSION` | `1` or `2` |
    /// | `OBJSTREAM_STRICT_CLASS_NAMES` | `"true"` or `"false"` |
    /// | `OBJSTREAM_SERIAL_FILTER` | filter pattern, e.g. `maxdepth=20;!com.evil.*` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = StreamConfigBuilder::new();

        if let Ok(val) = std::env::var(ENV_PROTOCOL_VERSION) {
            let version = val.trim().parse::<u32>().map_err(|_| {
                ConfigError::new(format!("{} must be a number, got {:?}", ENV_PROTOCOL_VERSION, val))
            })?;
            builder = builder.protocol_number(version);
        }

        if let Ok(val) = std::env::var(ENV_STRICT_CLASS_NAMES) {
            builder = builder.strict_class_names(val.trim().eq_ignore_ascii_case("true"));
        }

        if let Ok(val) = std::env::var(ENV_SERIAL_FILTER) {
            if !val.trim().is_empty() {
                builder = builder.serial_filter(val);
            }
        }

        builder.build()
    }
}

/// Builder for [`StreamConfig`].
#[derive(Debug, Clone, Default)]
pub struct StreamConfigBuilder {
    protocol_version: Option<ProtocolVersion>,
    protocol_number: Option<u32>,
    strict_class_names: Option<bool>,
    serial_filter: Option<String>,
}

impl StreamConfigBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the protocol version.
    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = Some(version);
        self.protocol_number = None;
        self
    }

    /// Sets the protocol version by number; validated in [`build`](Self::build).
    pub fn protocol_number(mut self, number: u32) -> Self {
        self.protocol_number = Some(number);
        self.protocol_version = None;
        self
    }

    /// Enables or disables exact class name matching.
    pub fn strict_class_names(mut self, strict: bool) -> Self {
        self.strict_class_names = Some(strict);
        self
    }

    /// Sets a serial filter pattern; compiled in [`build`](Self::build).
    pub fn serial_filter(mut self, pattern: impl Into<String>) -> Self {
        self.serial_filter = Some(pattern.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - the protocol number is neither 1 nor 2
    /// - the serial filter pattern does not parse
    pub fn build(self) -> Result<StreamConfig, ConfigError> {
        let protocol_version = match (self.protocol_version, self.protocol_number) {
            (Some(version), _) => version,
            (None, Some(number)) => ProtocolVersion::from_number(number).ok_or_else(|| {
                ConfigError::new(format!("unknown protocol version: {}", number))
            })?,
            (None, None) => ProtocolVersion::default(),
        };
        let serial_filter = self
            .serial_filter
            .map(|pattern| {
                PatternFilter::parse(&pattern)
                    .map_err(|e| ConfigError::new(format!("invalid serial filter: {}", e)))
            })
            .transpose()?;
        Ok(StreamConfig {
            protocol_version,
            strict_class_names: self.strict_class_names.unwrap_or(false),
            serial_filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.protocol_version(), ProtocolVersion::V2);
        assert!(!config.strict_class_names());
        assert!(config.serial_filter().is_none());
        assert!(config.filter_handle().is_none());
    }

    #[test]
    fn test_builder() {
        let config = StreamConfig::builder()
            .protocol_version(ProtocolVersion::V1)
            .strict_class_names(true)
            .serial_filter("maxdepth=5;!com.evil.*")
            .build()
            .unwrap();
        assert_eq!(config.protocol_version(), ProtocolVersion::V1);
        assert!(config.strict_class_names());
        assert_eq!(
            config.serial_filter().map(PatternFilter::source),
            Some("maxdepth=5;!com.evil.*")
        );
    }

    #[test]
    fn test_builder_rejects_bad_protocol() {
        let err = StreamConfig::builder().protocol_number(3).build().unwrap_err();
        assert_eq!(err.to_string(), "configuration error: unknown protocol version: 3");
    }

    #[test]
    fn test_builder_rejects_bad_filter() {
        assert!(StreamConfig::builder()
            .serial_filter("maxdepth=lots")
            .build()
            .is_err());
    }

    #[test]
    fn test_config_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConfigError>();
        assert_send_sync::<StreamConfig>();
    }
}
