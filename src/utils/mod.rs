pub mod config;
pub mod ext;

// Re-export commonly used types for convenience
pub use config::{Config, OutputFormat};
