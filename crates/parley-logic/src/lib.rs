//! Pure session rules for Parley.
//!
//! This crate contains every rule of ship-to-ship interaction that is
//! independent of the store, the network, or a UI. Functions take plain
//! records and return new records, so both the SpacetimeDB module and the
//! in-process client core run exactly the same logic, and all of it is
//! unit-testable.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`ambient`] | Solo random events raised while sailing |
//! | [`chat`] | Append-only chat log, read receipts, typing indicator state |
//! | [`combat`] | Turn-alternating combat: action table, turn resolution, rewards |
//! | [`config`] | Tunables (ranges, cadences, rules) and their validation |
//! | [`error`] | Failure taxonomy: stale target, write failure, invalid action |
//! | [`movement`] | Optimistic local movement, bounded commits, ambient timer |
//! | [`proximity`] | Range scan over players and AI ships |
//! | [`session`] | Shared lifecycle, interaction requests, status vocabulary |
//! | [`ship`] | Ship stats, trade resources, clamped stat deltas |
//! | [`trade`] | Dual-approval offer negotiation and settlement |

pub mod ambient;
pub mod chat;
pub mod combat;
pub mod config;
pub mod error;
pub mod movement;
pub mod proximity;
pub mod session;
pub mod ship;
pub mod trade;
