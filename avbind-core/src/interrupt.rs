//! Cooperative cancellation for long-running operations.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation flag.
///
/// Any clone may request cancellation; loops that hold a clone call
/// [`Interrupt::check`] between iterations.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear a previous request.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `Err(Interrupted)` if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_triggered() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_is_shared() {
        let a = Interrupt::new();
        let b = a.clone();
        assert!(a.check().is_ok());
        b.trigger();
        assert!(matches!(a.check(), Err(Error::Interrupted)));
        a.reset();
        assert!(!b.is_triggered());
    }
}
