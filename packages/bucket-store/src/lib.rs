//! Nested namespaces ("buckets") over one embedded key-value file.
//!
//! The store is a single redb table. Bucket paths are flattened into
//! NUL-terminated composite keys so that every subtree is one contiguous key
//! range:
//!
//! ```text
//! containers\0                      -> bucket
//! containers\0web\0                 -> bucket
//! containers\0web\0ip\0             -> "10.10.0.2"
//! portmap\0tcp\0 0.0.0.0:22\0       -> bucket
//! ```
//!
//! Use this layer for:
//! - Nested buckets on top of an ordered key-value store
//! - One-transaction-per-call access with no handle kept open in between
//!
//! # Example
//!
//! ```rust,no_run
//! use agentdb_bucket_store::{BucketStore, OpenOptions};
//!
//! let store = BucketStore::new("/var/lib/agent/agent.db", OpenOptions::default());
//! let names = store.view(|tx| tx.buckets())?;
//! # Ok::<(), agentdb_bucket_store::Error>(())
//! ```

mod bucket;
mod error;
mod key;
mod path;
mod store;

pub use bucket::{Bucket, BucketMut, BucketStats};
pub use error::Error;
pub use path::{BucketPath, PathError};
pub use store::{BucketStore, OpenOptions, ReadTx, WriteTx};
