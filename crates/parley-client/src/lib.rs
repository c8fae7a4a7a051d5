//! Per-client coordination core for Parley.
//!
//! Everything one captain's client does between the pure rules in
//! `parley-logic` and the shared store: watching the change feed,
//! negotiating sessions, running them, and writing the outcome back to the
//! captain's own stats.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`ai`] | AI fleet port and the helm that plays AI ships in combat |
//! | [`client`] | `PirateClient` facade: frame loop, feed pump, player actions |
//! | [`feed`] | Tables, rows, change events, subscription filters, version gate |
//! | [`handlers`] | Combat, trade and chat session handlers and their effects |
//! | [`negotiation`] | Interaction requests: initiate, answer, withdraw, close |
//! | [`registry`] | Open sessions, at most one per counterpart |
//! | [`stats`] | The local player's own stat write path |
//! | [`store`] | `SessionStore` port and the in-process `MemoryStore` |
//! | [`ui`] | Events handed to the renderer |

pub mod ai;
pub mod client;
pub mod feed;
pub mod handlers;
pub mod negotiation;
pub mod registry;
pub mod stats;
pub mod store;
pub mod ui;

pub use client::{ConnectError, PirateClient};
pub use store::{MemoryStore, SessionStore};
