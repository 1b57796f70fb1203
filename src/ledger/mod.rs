//! The ledger core: session lifecycle, per-participant aggregates and the
//! append-only transaction log.
//!
//! - [`machine`] holds the session and participant state machines.
//! - [`ops`] holds the pure aggregate arithmetic.
//! - [`engine`] applies operations atomically under a per-session lock.
//! - [`events`] describes what each committed operation tells the rest of
//!   the server.

pub mod engine;
pub mod events;
pub mod machine;
pub mod ops;

pub use engine::LedgerEngine;
pub use events::{EventSink, LedgerEvent, NullSink};
pub use machine::Mutation;
