use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Sizing and recovery policy for a disk list file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ListConfig {
    /// Minimum file size in bytes. The file is grown to this on open.
    pub initial_size: u64,

    /// Extra headroom added on each grow, as a fraction of `initial_size`.
    pub scale_factor: f32,

    /// Refuse to open a file whose links could not be fully rebuilt.
    pub strict_recovery: bool,
}

impl ListConfig {
    pub const DEFAULT_INITIAL_SIZE: u64 = 20 * 1024;
    pub const DEFAULT_SCALE_FACTOR: f32 = 0.75;

    pub fn new(initial_size: u64, scale_factor: f32) -> Self {
        Self {
            initial_size,
            scale_factor,
            strict_recovery: false,
        }
    }

    pub fn strict(mut self) -> Self {
        self.strict_recovery = true;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_size == 0 {
            return Err(ConfigError::ZeroInitialSize);
        }
        if !self.scale_factor.is_finite() || self.scale_factor < 0.0 {
            return Err(ConfigError::InvalidScaleFactor(self.scale_factor));
        }
        Ok(())
    }

    /// Bytes added on top of a requested size whenever the file must grow.
    pub fn headroom(&self) -> u64 {
        (self.scale_factor as f64 * self.initial_size as f64) as u64
    }
}

impl Default for ListConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INITIAL_SIZE, Self::DEFAULT_SCALE_FACTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ListConfig::default();
        assert_eq!(config.initial_size, 20 * 1024);
        assert!(config.validate().is_ok());
        assert!(!config.strict_recovery);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert_eq!(
            ListConfig::new(0, 0.5).validate(),
            Err(ConfigError::ZeroInitialSize)
        );
        assert!(matches!(
            ListConfig::new(1024, -0.1).validate(),
            Err(ConfigError::InvalidScaleFactor(_))
        ));
        assert!(ListConfig::new(1024, f32::NAN).validate().is_err());
    }

    #[test]
    fn test_headroom() {
        assert_eq!(ListConfig::new(1000, 0.5).headroom(), 500);
        assert_eq!(ListConfig::new(1000, 0.0).headroom(), 0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ListConfig = serde_json::from_str(r#"{"initial_size": 4096}"#).unwrap();
        assert_eq!(config.initial_size, 4096);
        assert_eq!(config.scale_factor, ListConfig::DEFAULT_SCALE_FACTOR);
        assert!(!config.strict_recovery);
    }
}
