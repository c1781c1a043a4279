// src/exec/interrupt.rs

//! Process-wide interrupt state.
//!
//! A single [`Interruptor`] is created per `Project` and handed down to
//! every subsystem that spawns work. When an interrupt or terminate signal
//! arrives, the interruptor is triggered once: the cancellation token fires
//! (so schedulers stop starting new work), the interrupted flag is set (so
//! process runners refuse to spawn), and the signal is remembered (so
//! runners can forward the same signal to children already in flight).
//!
//! Tests trigger the interruptor directly instead of sending real signals.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{info, warn};

/// Which signal triggered the interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptSignal {
    Interrupt,
    Terminate,
}

impl InterruptSignal {
    /// Human-readable name used in the user-visible notice.
    pub fn name(self) -> &'static str {
        match self {
            InterruptSignal::Interrupt => "interrupt",
            InterruptSignal::Terminate => "terminate",
        }
    }

    #[cfg(unix)]
    pub fn as_nix(self) -> nix::sys::signal::Signal {
        match self {
            InterruptSignal::Interrupt => nix::sys::signal::Signal::SIGINT,
            InterruptSignal::Terminate => nix::sys::signal::Signal::SIGTERM,
        }
    }
}

const SIG_NONE: u8 = 0;
const SIG_INT: u8 = 1;
const SIG_TERM: u8 = 2;

/// Shared, cloneable handle to the process-wide interrupt state.
#[derive(Debug, Clone, Default)]
pub struct Interruptor {
    token: CancellationToken,
    interrupted: Arc<AtomicBool>,
    signal: Arc<AtomicU8>,
}

impl Interruptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the process as interrupted by `signal`. Idempotent; only the
    /// first trigger records its signal.
    pub fn trigger(&self, signal: InterruptSignal) {
        let raw = match signal {
            InterruptSignal::Interrupt => SIG_INT,
            InterruptSignal::Terminate => SIG_TERM,
        };
        let _ = self
            .signal
            .compare_exchange(SIG_NONE, raw, Ordering::SeqCst, Ordering::SeqCst);
        self.interrupted.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    /// True once a signal has been received; new subprocesses must not be
    /// spawned.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Resolves when the interruptor is triggered.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// The cancellation token, for schedulers that stop starting new work.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The signal to forward to children. Defaults to interrupt when the
    /// interruptor was triggered without one (e.g. programmatically).
    pub fn signal(&self) -> InterruptSignal {
        match self.signal.load(Ordering::SeqCst) {
            SIG_TERM => InterruptSignal::Terminate,
            _ => InterruptSignal::Interrupt,
        }
    }

    /// Install the OS signal listener. On the first interrupt or terminate
    /// signal this prints the user-visible notice once and triggers the
    /// interruptor; children receive the forwarded signal from their
    /// process runners.
    pub fn listen(&self) {
        let this = self.clone();

        tokio::spawn(async move {
            let signal = wait_for_signal().await;
            let Some(signal) = signal else {
                return;
            };

            info!(signal = signal.name(), "received signal");
            println!("\nReceived signal: {}, cancelling operation...", signal.name());
            this.trigger(signal);
        });
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Option<InterruptSignal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(err) => {
            warn!(error = %err, "failed to install SIGINT handler");
            return None;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            warn!(error = %err, "failed to install SIGTERM handler");
            return None;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => Some(InterruptSignal::Interrupt),
        _ = terminate.recv() => Some(InterruptSignal::Terminate),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Option<InterruptSignal> {
    match tokio::signal::ctrl_c().await {
        Ok(()) => Some(InterruptSignal::Interrupt),
        Err(err) => {
            warn!(error = %err, "failed to listen for Ctrl+C");
            None
        }
    }
}
