//! Parcel content kernel library.
//!
//! Content-bearing entities share one envelope record holding visibility,
//! moderation flags, ownership and container placement. This library binds
//! entities to their envelopes and keeps both consistent across save, delete
//! and move. The `parcel` binary provides schema and maintenance commands.

pub mod config;
pub mod container;
pub mod content;
pub mod db;
pub mod error;
pub mod follow;
pub mod models;
pub mod permissions;
pub mod session;
pub mod store;
