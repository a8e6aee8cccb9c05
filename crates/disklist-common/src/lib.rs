pub mod config;
pub mod data;
pub mod error;

// Re-export commonly used types
pub use config::ListConfig;
pub use data::Data;
pub use error::ConfigError;
