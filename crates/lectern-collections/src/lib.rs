//! Collection accessors for the reading-community backend.
//!
//! Each domain area owns exactly one file path and the top-level shape
//! convention for its document: a bare array (users), a wrapped object
//! (authors, forums), or a map keyed by user id (shelf, events). The store
//! underneath is shape-agnostic; every read-modify-write sequence here runs
//! under the store's per-path guard so concurrent handlers cannot lose
//! updates.

pub mod authors;
pub mod events;
pub mod forums;
pub mod shelf;
pub mod users;
