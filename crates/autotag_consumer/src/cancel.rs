use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Exit status used when a repeated signal aborts a graceful stop.
pub const FORCED_EXIT_CODE: i32 = 130;

/// What a received stop signal should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First request: finish the current message, then stop.
    Graceful,
    /// The token was already cancelled: exit now.
    ForceExit,
}

/// Shutdown flag shared between signal handlers and the receive loop.
///
/// Clone is cheap and shares state. The loop only polls it between frames,
/// so a message being handled always runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Cancel the token and report whether an earlier request already had.
    pub fn on_signal(&self) -> SignalAction {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            SignalAction::ForceExit
        } else {
            SignalAction::Graceful
        }
    }

    /// Cancel this token on SIGINT or SIGTERM. A second signal exits the
    /// process without waiting for the current message.
    #[cfg(unix)]
    pub fn cancel_on_signals(&self) -> std::io::Result<()> {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let token = self.clone();
        std::thread::Builder::new()
            .name("autotag-signals".into())
            .spawn(move || {
                for sig in signals.forever() {
                    match token.on_signal() {
                        SignalAction::Graceful => info!(
                            signal = sig,
                            "Received signal, finishing current message then stopping"
                        ),
                        SignalAction::ForceExit => {
                            warn!(signal = sig, "Received second signal, exiting immediately");
                            std::process::exit(FORCED_EXIT_CODE);
                        }
                    }
                }
            })?;
        Ok(())
    }

    /// Cancel this token on Ctrl+C; a second Ctrl+C exits the process.
    /// Must be called inside a tokio runtime.
    #[cfg(not(unix))]
    pub fn cancel_on_signals(&self) -> std::io::Result<()> {
        let token = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                match token.on_signal() {
                    SignalAction::Graceful => {
                        info!("Received Ctrl+C, finishing current message then stopping")
                    }
                    SignalAction::ForceExit => {
                        warn!("Received second Ctrl+C, exiting immediately");
                        std::process::exit(FORCED_EXIT_CODE);
                    }
                }
            }
        });
        Ok(())
    }
}
