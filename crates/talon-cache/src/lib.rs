//! # `talon-cache`
//!
//! A concurrent, bounded, in-process cache engine: size/weight-based
//! eviction, time-based expiration, weak/soft reference reclamation,
//! single-flight loading, refresh-ahead, and removal notifications, all
//! behind a small synchronous API.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use talon_cache::Cache;
//!
//! let cache: Cache<String, u64> = Cache::builder()
//!     .max_size(10_000)
//!     .expire_after_write(Duration::from_secs(300))
//!     .record_stats()
//!     .build()
//!     .expect("valid configuration");
//!
//! cache.insert("answer".to_string(), 42);
//! assert_eq!(cache.get(&"answer".to_string()).as_deref(), Some(&42));
//! ```
//!
//! ## Single-flight loading
//!
//! ```rust
//! use talon_cache::{Cache, Error, FnLoader};
//!
//! let cache: Cache<u64, String> = Cache::builder().max_size(1_000).build().unwrap();
//! let loader = FnLoader(|key: &u64| -> Result<String, Error> { Ok(format!("value-{key}")) });
//! let value = cache.get_with(&7, &loader).unwrap();
//! assert_eq!(&*value, "value-7");
//! ```
//!
//! Concurrent callers racing on the same missing key all block on the same
//! in-flight load rather than each invoking the loader; see [`Cache::get_with`].
//!
//! ## Scope
//!
//! This crate is the cache engine itself. It does not provide a
//! command-line tool, a facade over another cache trait (e.g. `tower`), or
//! a statistics exporter; see `DESIGN.md` for the reasoning.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod builder;
mod buffer;
mod cache;
mod entry;
mod error;
mod executor;
mod index;
mod loader;
mod maintenance;
mod notification;
mod policy;
mod reference;
mod stats;
mod ticker;
mod unbounded;

pub use builder::CacheBuilder;
pub use cache::Cache;
pub use error::{Error, LoaderError, Result};
pub use executor::{DirectExecutor, Executor, ThreadPoolExecutor};
pub use loader::{FnLoader, Loader};
pub use notification::RemovalCause;
pub use reference::{WeakKey, WeakRef};
pub use stats::CacheStats;
pub use ticker::{ManualTicker, SystemTicker, Ticker};
pub use unbounded::UnboundedCache;
