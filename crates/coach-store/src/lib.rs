//! Durable interview session records.
//!
//! Each interview is stored as one pretty-printed JSON document named
//! `{interview_id}.json` under the store directory. Every mutation is a
//! read-modify-write of the whole record, written to a sibling `.json.tmp`
//! file and renamed into place so readers never observe a torn write.
//!
//! # Concurrency
//!
//! Writers for the same interview ID are serialized through a per-ID lock.
//! Writers for different IDs proceed independently. The API is blocking;
//! async callers run it on `tokio::task::spawn_blocking`.

mod store;

pub use store::{NewInterview, SessionStore, StoreError};
