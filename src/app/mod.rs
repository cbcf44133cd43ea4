//! Application boundary.
//!
//! The trial sequencer talks to the outside world only through the
//! **port traits** defined in [`ports`], keeping the session logic fully
//! testable without a rig attached.

pub mod events;
pub mod ports;
