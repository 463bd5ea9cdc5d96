use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Advisory cancellation flag shared between a host and a long computation
///
/// Long loops (spectrogram windows, EDF records) poll the flag between
/// iterations. Clones share the same flag.
///
/// ```rust
/// use eegkit::CancelToken;
///
/// let token = CancelToken::new();
/// let worker_side = token.clone();
/// assert!(!worker_side.is_cancelled());
/// token.cancel();
/// assert!(worker_side.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clears the flag so the token can be reused for the next job
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// `true` when a token was supplied and has been cancelled
pub(crate) fn is_cancelled(token: Option<&CancelToken>) -> bool {
    token.map_or(false, CancelToken::is_cancelled)
}
