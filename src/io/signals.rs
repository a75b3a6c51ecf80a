//! Signal handling: translate process signals into engine events.
//!
//! A dedicated thread drains the signal-hook iterator and forwards shutdown
//! requests onto the engine's event channel, so the inter-cycle sleep wakes
//! promptly instead of waiting out its timeout. The `running` flag is the
//! cancellation token threaded through every loop and wait point; the
//! channel message exists to interrupt the wait, the flag to decide it.

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM},
    iterator::Signals,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::engine::commands::EngineEvent;

/// Messages the signal thread can deliver to the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMessage {
    /// Termination request (SIGTERM, SIGINT, SIGHUP).
    Shutdown,
}

/// Shared cancellation state between the signal thread and the engine.
pub struct SignalState {
    /// True while the application should keep running.
    pub running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SignalState {
    /// Ask the signal thread to wind down (used on normal exit paths where
    /// no signal ever arrived).
    pub fn finish(mut self) {
        self.running.store(false, Ordering::SeqCst);
        // The iterator thread exits on its own after the next signal or when
        // the process ends; do not block shutdown waiting for it.
        if let Some(handle) = self.handle.take()
            && handle.is_finished()
        {
            let _ = handle.join();
        }
    }
}

/// Install the signal handler thread.
///
/// Forwards one `Shutdown` event per termination signal and flips `running`
/// to false before sending, so the engine observes the flag even if the
/// channel is full or gone.
pub fn setup_signal_handler(events: Sender<EngineEvent>) -> Result<SignalState> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    let mut signals = Signals::new([SIGTERM, SIGINT, SIGHUP])
        .context("Failed to install signal handlers")?;

    let handle = std::thread::spawn(move || {
        for signal in signals.forever() {
            let name = match signal {
                SIGTERM => "SIGTERM",
                SIGINT => "SIGINT",
                SIGHUP => "SIGHUP",
                _ => continue,
            };
            log_pipe!();
            log_info!("Received {name}, initiating graceful shutdown...");

            running_clone.store(false, Ordering::SeqCst);
            if let Err(e) = events.send(EngineEvent::Signal(SignalMessage::Shutdown)) {
                log_warning!("Failed to deliver shutdown to main loop: {e}");
            }
            break;
        }
    });

    Ok(SignalState {
        running,
        handle: Some(handle),
    })
}
