//! # pagecache
//!
//! Byte-bounded LRU cache for static file contents.
//!
//! ## Architecture
//! - **HashMap**: AHash for fast lookups (O(1))
//! - **LRU List**: Arena-backed doubly-linked list for eviction (O(1))
//! - **Accounting**: Capacity is measured in value bytes, not entry count
//! - **Sharing**: `FileCache` serializes every operation behind one mutex so
//!   it can be shared across worker threads

#![warn(missing_docs)]

mod cache;
mod lru;
mod stats;

pub use cache::FileCache;
pub use lru::{LruCache, Weighted};
pub use stats::CacheStats;
