//! # Repositories
//!
//! The read surface of the cache plus the single serialized writer.
//!
//! - [`reminders`] - reminder lookups, pair mode stats, completion counts
//! - [`events`] - event-log aggregates: miss counts, streak deltas, patterns
//! - [`preferences`] - latest preference snapshot per user
//! - [`cursor`] - sync cursor reads
//! - [`writer`] - all mutations: sync batches, pruning, clearing

pub mod cursor;
pub mod events;
pub mod preferences;
pub mod reminders;
pub mod writer;
