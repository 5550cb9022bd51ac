//! Background delivery of parameter change notifications.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::tree::ParameterAutomationTree;

/// Default interval between dispatches (about 30 Hz).
pub const DEFAULT_PUMP_INTERVAL: Duration = Duration::from_millis(33);

/// Thread that periodically calls
/// [`ParameterAutomationTree::dispatch_notifications`].
///
/// Render-thread writes only mark ids as changed; this pump is what hands them
/// to observers outside the real-time context. The thread stops and is joined
/// when the pump is dropped.
pub struct NotificationPump {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl NotificationPump {
    /// Start a pump with the default interval.
    pub fn start(tree: Arc<ParameterAutomationTree>) -> std::io::Result<Self> {
        Self::with_interval(tree, DEFAULT_PUMP_INTERVAL)
    }

    /// Start a pump that dispatches every `interval`.
    pub fn with_interval(
        tree: Arc<ParameterAutomationTree>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("shimmer-notify".into())
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    tree.dispatch_notifications();
                    thread::park_timeout(interval);
                }
                // Deliver whatever was written before shutdown.
                tree.dispatch_notifications();
            })?;

        log::debug!("Notification pump started ({:?} interval)", interval);

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it to finish.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.running.store(false, Ordering::Release);
        handle.thread().unpark();
        if handle.join().is_err() {
            log::error!("Notification pump thread panicked");
        }
    }
}

impl Drop for NotificationPump {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ParameterCatalog;
    use std::sync::mpsc;
    use std::sync::Mutex;

    #[test]
    fn test_pump_delivers_render_side_writes() {
        let tree = Arc::new(ParameterAutomationTree::new(ParameterCatalog::effect()).unwrap());
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        tree.observe_changes(move |id, v| {
            let _ = tx.lock().unwrap().send((id, v));
        });

        let _pump = NotificationPump::with_interval(Arc::clone(&tree), Duration::from_millis(1))
            .unwrap();
        tree.set_value(4, 0.8).unwrap();

        let delivered = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(delivered, (4, 0.8));
    }

    #[test]
    fn test_stop_flushes_pending_changes() {
        let tree = Arc::new(ParameterAutomationTree::new(ParameterCatalog::effect()).unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        tree.observe_changes(move |id, _| sink.lock().unwrap().push(id));

        let mut pump =
            NotificationPump::with_interval(Arc::clone(&tree), Duration::from_secs(60)).unwrap();
        tree.set_value(2, 0.1).unwrap();
        pump.stop();
        pump.stop();

        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }
}
