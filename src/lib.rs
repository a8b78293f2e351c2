pub mod config;
pub mod downloader;
pub mod service;
pub mod sweeper;
pub mod telemetry;
pub mod validation;

pub use config::{ConfigError, ServiceConfig};
pub use downloader::{DownloadError, DownloadOptions, DownloadResult, ErrorKind, MediaInfo, Platform};
pub use service::MediaService;
pub use validation::{validate_url, ValidatedUrl, ValidationError};
