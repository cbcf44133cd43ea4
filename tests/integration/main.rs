//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that runs whole sessions against one
//! rig backend.  All tests run on the host with no real hardware.

mod harness;
mod interactive_tests;
mod physical_tests;
mod sequencer_tests;
