pub mod content;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod source;

pub use content::{ContentFormat, LinkSet, SitemapContent, network_location};
pub use error::{FetchFailure, ScanError};
pub use extract::extract_links;
pub use fetcher::{FetchConfig, Fetcher};
pub use source::{BrowserSource, FetchSession, HttpSource, PageSource};
