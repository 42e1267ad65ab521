pub mod error;
pub mod models;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use models::{ExpectedSplit, VodMap, VodRecord, VodStatus};
pub use store::{JsonVodStore, JsonVodStoreBuilder};
