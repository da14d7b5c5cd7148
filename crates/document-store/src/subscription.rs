//! Subscription handles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Teardown = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a live subscription.
///
/// The listener stops being invoked once the handle is unsubscribed or
/// dropped. Backends check the shared `active` flag before every delivery.
pub struct Subscription {
    active: Arc<AtomicBool>,
    teardown: Option<Teardown>,
}

impl Subscription {
    pub fn new(active: Arc<AtomicBool>, teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            active,
            teardown: Some(Box::new(teardown)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn unsubscribe(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn teardown_runs_once_on_unsubscribe() {
        let active = Arc::new(AtomicBool::new(true));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = Subscription::new(active.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(sub.is_active());
        sub.unsubscribe();
        assert!(!active.load(Ordering::SeqCst));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_tears_down() {
        let active = Arc::new(AtomicBool::new(true));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _sub = Subscription::new(active.clone(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(!active.load(Ordering::SeqCst));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
