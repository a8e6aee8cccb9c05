use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Initial size must be greater than zero")]
    ZeroInitialSize,

    #[error("Scale factor must be finite and non-negative, got {0}")]
    InvalidScaleFactor(f32),
}
