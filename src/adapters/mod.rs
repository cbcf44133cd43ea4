//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter        | Implements | Connects to                              |
//! |----------------|------------|------------------------------------------|
//! | `null`         | Rig        | Nothing (injected edges, recorded output)|
//! | `interactive`  | Rig        | A key stream (terminal or test channel)  |
//! | `terminal`     |    -       | crossterm raw-mode key reader            |
//! | `physical`     | Rig        | `embedded-hal` 1.0 input/output pins     |
//! | `gpio`         |    -       | Linux GPIO character device (`rpi`)      |
//! | `log_sink`     | EventSink  | `log` facade                             |

use std::time::Duration;

#[cfg(feature = "rpi")]
pub mod gpio;
pub mod interactive;
pub mod log_sink;
pub mod null;
pub mod physical;
pub mod terminal;

/// Poll period of blocking backend waits.
pub const WAIT_POLL: Duration = Duration::from_millis(10);
