//! Per-sensor edge debouncing.
//!
//! An edge is accepted only if at least `window_ms` have passed since the
//! last *accepted* edge on the same sensor.  Rejected edges do not extend
//! the window, matching the bouncetime semantics of the GPIO edge
//! detector on the rig.

use super::RawInput;

pub struct Debouncer {
    /// Monotonic millisecond stamp of the last accepted edge per slot.
    last_accepted_ms: [Option<u32>; RawInput::SLOTS],
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}

impl Debouncer {
    pub fn new() -> Self {
        Self {
            last_accepted_ms: [None; RawInput::SLOTS],
        }
    }

    /// Returns `true` if the edge passes the window and records it.
    pub fn accept(&mut self, input: RawInput, now_ms: u32, window_ms: u32) -> bool {
        let slot = &mut self.last_accepted_ms[input.slot()];
        if let Some(last) = *slot {
            if now_ms.wrapping_sub(last) < window_ms {
                return false;
            }
        }
        *slot = Some(now_ms);
        true
    }

    /// Forget all history (e.g. when a new monitoring phase is armed).
    pub fn reset(&mut self) {
        self.last_accepted_ms = [None; RawInput::SLOTS];
    }
}
