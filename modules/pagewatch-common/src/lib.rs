pub mod config;
pub mod error;
pub mod file_config;
pub mod hash;
pub mod types;

pub use config::AppConfig;
pub use error::PagewatchError;
pub use file_config::{load_config, FileConfig};
pub use hash::{content_hash, url_key};
pub use types::*;
