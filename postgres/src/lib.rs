//! PostgreSQL store for the simtrack lifecycle core.
//!
//! This crate provides the production [`simtrack_core::SimStore`]
//! implementation. It uses sqlx with runtime-bound queries and makes the
//! locking explicit:
//!
//! - `SELECT ... FOR UPDATE` scopes an exclusive lock to the single
//!   `sim_cards` row for the duration of transition + event append
//! - a per-transaction `lock_timeout` turns an unbounded lock wait into
//!   [`simtrack_core::SimError::ConcurrencyConflict`]
//! - unique violations on `iccid`/`msisdn` map to
//!   [`simtrack_core::SimError::DuplicateIdentifier`] by constraint name,
//!   which is what drives the allocator's bounded retry
//!
//! # Example
//!
//! ```no_run
//! use simtrack_postgres::PgSimStore;
//! use simtrack_core::LifecycleManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PgSimStore::connect("postgres://localhost/simtrack").await?;
//! store.migrate().await?;
//! let manager = LifecycleManager::new(store);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod store;

pub use store::{PgSimStore, PgSimTransaction};
