//! Raw-mode terminal key reader for the interactive backend.
//!
//! Puts the terminal in raw mode and forwards every character typed to a
//! channel.  Ctrl-C and `q` cancel the session instead (raw mode swallows
//! SIGINT).  Dropping the reader stops its thread and restores the
//! terminal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::{error, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};

const READ_POLL: Duration = Duration::from_millis(50);

pub struct TerminalKeys {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TerminalKeys {
    /// Enter raw mode and start reading.  Returns the key stream.
    pub fn spawn(cancel: CancelToken) -> Result<(Self, Receiver<char>)> {
        terminal::enable_raw_mode().map_err(|_| Error::HardwareInit("terminal raw mode"))?;

        let (tx, rx) = channel::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("terminal-keys".into())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    match event::poll(READ_POLL) {
                        Ok(false) => continue,
                        Ok(true) => {}
                        Err(e) => {
                            error!("Terminal poll failed: {e}");
                            cancel.cancel();
                            return;
                        }
                    }
                    let Ok(Event::Key(key)) = event::read() else {
                        continue;
                    };
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    match key.code {
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                            cancel.cancel();
                        }
                        KeyCode::Char('q') => cancel.cancel(),
                        KeyCode::Char(c) => {
                            if tx.send(c).is_err() {
                                return;
                            }
                        }
                        _ => {}
                    }
                }
            });

        let handle = match handle {
            Ok(h) => h,
            Err(_) => {
                let _ = terminal::disable_raw_mode();
                return Err(Error::HardwareInit("terminal reader thread"));
            }
        };

        Ok((Self { shutdown, handle: Some(handle) }, rx))
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
        if let Err(e) = terminal::disable_raw_mode() {
            warn!("Could not restore terminal: {e}");
        }
    }
}
