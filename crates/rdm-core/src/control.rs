//! Cooperative interruption of running attempts.
//!
//! Each admitted attempt gets an `AbortToken`. `pause`/`cancel` record their
//! intent on the token; the transfer loop checks it between chunks and stops,
//! and the engine reads the intent to pick the final status.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Why an attempt is being stopped from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Pause,
    Cancel,
}

impl Interrupt {
    fn to_u8(self) -> u8 {
        match self {
            Interrupt::Pause => 1,
            Interrupt::Cancel => 2,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Interrupt::Pause),
            2 => Some(Interrupt::Cancel),
            _ => None,
        }
    }
}

/// Shared abort flag plus the intent behind it.
#[derive(Debug, Default)]
pub struct AbortToken {
    aborted: AtomicBool,
    intent: AtomicU8,
}

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the attempt to stop. A cancel overrides an earlier pause; a pause
    /// never downgrades a cancel.
    pub fn request(&self, intent: Interrupt) {
        match intent {
            Interrupt::Cancel => self.intent.store(intent.to_u8(), Ordering::SeqCst),
            Interrupt::Pause => {
                let _ = self.intent.compare_exchange(
                    0,
                    intent.to_u8(),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
            }
        }
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// The recorded intent, if an interrupt was requested.
    pub fn intent(&self) -> Option<Interrupt> {
        Interrupt::from_u8(self.intent.load(Ordering::SeqCst))
    }
}
