mod error;
mod helix;
mod scrape;
mod source;

pub use error::{DiscoveryError, DiscoveryResult};
pub use helix::{HelixClient, HelixCredentials, HelixSourceFactory};
pub use scrape::{merge_discovered, render_titles, Discoverer, DiscoveryReport};
pub use source::{RawRecording, VodSource, VodSourceFactory, ARCHIVE_TYPE};
