//! Session store backends for the Talon runtime.
//!
//! Three implementations of `talon_core::SessionStore`:
//!
//! * [`InMemoryStore`] — volatile map, for tests and ephemeral runs
//! * [`FileStore`] — append-only framed log + atomic snapshot, with
//!   crash-recovery truncation of torn tails
//! * [`CompositeStore`] — routes id prefixes to different backends

pub mod composite;
pub mod file_store;
pub mod in_memory;
pub mod record;

pub use composite::CompositeStore;
pub use file_store::FileStore;
pub use in_memory::InMemoryStore;
