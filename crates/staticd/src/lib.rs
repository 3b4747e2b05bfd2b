//! # staticd
//!
//! Static file HTTP server built from a fixed worker pool and a shared LRU
//! file cache.
//!
//! ## Pipeline
//! - **Server**: accepts TCP connections and hands each to the pool
//! - **WorkerPool**: persistent threads draining a closable FIFO queue
//! - **RequestHandler**: one GET per connection, cache first, disk on miss
//! - **Stats**: request count, cache hits and latency under one lock

#![warn(missing_docs)]

pub mod config;
mod error;
pub mod handler;
pub mod http;
pub mod pool;
pub mod queue;
pub mod server;
pub mod stats;

pub use config::{Cli, ServerConfig};
pub use error::{Error, RequestError, Result};
pub use handler::RequestHandler;
pub use pool::{EnqueueError, WorkerPool};
pub use server::{Server, ServerState, StopHandle};
pub use stats::{Stats, StatsSnapshot};
