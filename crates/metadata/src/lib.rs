//! Workload ownership metadata: the control-plane resolver contract and
//! the TTL/negative cache in front of it.

pub mod cache;
pub mod resolver;

pub use cache::{CacheConfig, MetadataCache};
pub use resolver::{HttpResolver, MetadataResolver, Ownership};
