// InfoExtractor module - best-effort media metadata

mod cli;
mod traits;

pub use cli::CliInfoExtractor;
pub use traits::{InfoExtractor, PlaceholderExtractor};
