//! Parley Server - SpacetimeDB Module
//!
//! The authoritative session store. Every row carries a version and every
//! reducer that changes a row is predicated on the version the caller last
//! saw, so two captains racing on one record never silently overwrite each
//! other. Clients run the session rules locally; reducers re-check them
//! with the same `parley-logic` functions before writing.

pub mod intents;
mod records;
mod reducers;
mod tables;

pub use reducers::*;
pub use tables::*;
