//! Reach-to-grasp training rig library.
//!
//! Exposes the trial sequencer, the rig port trait, and its three
//! backends for the binary and for integration testing.  Pin access on
//! real hardware is behind the `rpi` feature.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod fsm;
pub mod pins;
pub mod rig;
pub mod sensors;
pub mod session;

pub use cancel::CancelToken;
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use session::{EndReason, SessionReport, Sequencer};
