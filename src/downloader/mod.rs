// Downloader module - yt-dlp job orchestration

pub mod diagnostics;
pub mod errors;
pub mod extractors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod profiles;
pub mod progress;
pub mod tools;
pub mod traits;
pub mod utils;

pub use errors::{DownloadError, ErrorDescriptor, ErrorKind};
pub use format_selector::{FormatPolicy, FormatSelector};
pub use models::{
    DownloadOptions, DownloadProgress, DownloadResult, JobPhase, MediaFormat, MediaInfo, MediaRequest, Platform,
    Quality,
};
pub use orchestrator::Downloader;
pub use traits::{LogProgress, NoopProgress, ProgressObserver};
