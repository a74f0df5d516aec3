//! Per-thread cooperative interruption flag.
//!
//! A thread can be flagged as interrupted, either by itself or by another
//! thread holding its [`Interrupter`]. The flag is a request that long-running
//! work *may* observe; it is never a reason for archive I/O to fail. Reads in
//! this workspace neither consult nor clear it, so a caller that sets the flag
//! before resolving an entry still receives the full entry contents and finds
//! the flag untouched afterwards.
//!
//! # Example
//!
//! ```
//! use matryoshka_common::interrupt;
//!
//! interrupt::interrupt_current();
//! assert!(interrupt::is_interrupted());
//!
//! // Check-and-clear, like a worker acknowledging the request.
//! assert!(interrupt::interrupted());
//! assert!(!interrupt::is_interrupted());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

thread_local! {
    static FLAG: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
}

/// A handle that can flag one particular thread as interrupted.
///
/// Obtained on the target thread with [`current_interrupter`] and then sent
/// to whichever thread wants to raise the flag.
#[derive(Debug, Clone)]
pub struct Interrupter {
    flag: Arc<AtomicBool>,
}

impl Interrupter {
    /// Raise the interruption flag of the thread this handle belongs to.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check the flag without clearing it.
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Get an [`Interrupter`] for the calling thread.
pub fn current_interrupter() -> Interrupter {
    FLAG.with(|flag| Interrupter {
        flag: Arc::clone(flag),
    })
}

/// Flag the calling thread as interrupted.
pub fn interrupt_current() {
    FLAG.with(|flag| flag.store(true, Ordering::SeqCst));
}

/// Check whether the calling thread is flagged, leaving the flag as is.
pub fn is_interrupted() -> bool {
    FLAG.with(|flag| flag.load(Ordering::SeqCst))
}

/// Check and clear the calling thread's flag.
///
/// Returns `true` if the flag was set.
pub fn interrupted() -> bool {
    FLAG.with(|flag| flag.swap(false, Ordering::SeqCst))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_starts_clear() {
        std::thread::spawn(|| {
            assert!(!is_interrupted());
            assert!(!interrupted());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_interrupted_clears_flag() {
        std::thread::spawn(|| {
            interrupt_current();
            assert!(is_interrupted());
            assert!(is_interrupted());
            assert!(interrupted());
            assert!(!is_interrupted());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_interrupter_from_other_thread() {
        let (tx, rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        let worker = std::thread::spawn(move || {
            tx.send(current_interrupter()).unwrap();
            done_rx.recv().unwrap();
            interrupted()
        });

        let handle = rx.recv().unwrap();
        handle.interrupt();
        assert!(handle.is_interrupted());
        done_tx.send(()).unwrap();

        assert!(worker.join().unwrap());
    }

    #[test]
    fn test_flags_are_per_thread() {
        std::thread::spawn(|| {
            interrupt_current();
            let other = std::thread::spawn(is_interrupted).join().unwrap();
            assert!(!other);
            assert!(interrupted());
        })
        .join()
        .unwrap();
    }
}
