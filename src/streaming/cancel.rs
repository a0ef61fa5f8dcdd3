// src/streaming/cancel.rs
//! Cancellation signal observed by the controller loop and both workers

use crossbeam::channel::{self, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Owner of the cancellation signal; dropping it also cancels
#[derive(Debug)]
pub struct CancelSource {
    flag: Arc<AtomicBool>,
    tx: Option<Sender<()>>,
    rx: Receiver<()>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(0);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            tx: Some(tx),
            rx,
        }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            flag: Arc::clone(&self.flag),
            rx: self.rx.clone(),
        }
    }

    pub fn cancel(&mut self) {
        self.flag.store(true, Ordering::Release);
        // Disconnecting wakes every token blocked in `select!`
        self.tx.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CancelSource {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Observer side of [`CancelSource`]
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    rx: Receiver<()>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Becomes ready (disconnected) once cancelled; for use in `select!`
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::select;
    use std::time::Duration;

    #[test]
    fn test_cancel_sets_flag_and_wakes_select() {
        let mut source = CancelSource::new();
        let token = source.token();
        assert!(!token.is_cancelled());

        source.cancel();
        assert!(token.is_cancelled());

        let woke = select! {
            recv(token.receiver()) -> _ => true,
            default(Duration::from_millis(100)) => false,
        };
        assert!(woke);
    }

    #[test]
    fn test_drop_cancels() {
        let token = CancelSource::new().token();
        assert!(token.is_cancelled());
    }
}
