//! SQLite persistence for the CEM pipeline: the tool-result TTL cache, the
//! parts database and design-job history.

pub mod cache;
pub mod error;
pub mod jobs;
pub mod parts;
pub mod schema;
pub mod store;

pub use cache::{
    CacheBackend, CacheEntry, CacheMeta, CacheStats, CacheStore, LayeredStats, MemoryCache,
};
pub use error::{Result, StoreError};
pub use jobs::{DesignJob, JobStatus};
pub use store::{DatabaseLocation, Store, parse_database_url};
