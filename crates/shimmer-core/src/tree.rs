//! Parameter automation tree.
//!
//! The [`ParameterAutomationTree`] holds the current value of every catalog
//! parameter and is the single synchronization point between the render thread
//! and non-real-time actors (UI, host automation bookkeeping).
//!
//! # Thread Safety
//!
//! Values live in one `AtomicU32` per parameter (the `f32` bit pattern), so reads
//! never observe a torn value and neither side ever waits on the other:
//! - `set_value` / `get_value` are lock-free and allocation-free
//! - the write-observer runs inline on the writing thread and must be real-time safe
//! - change observers registered with `observe_changes` are only ever called from
//!   `dispatch_notifications`, which a non-real-time context drives
//!   (see [`NotificationPump`](crate::NotificationPump))
//!
//! The observer registry is behind a `Mutex`, but only registration, removal and
//! dispatch take it. None of those run on the render thread.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::catalog::{ParameterCatalog, ParameterDescriptor};
use crate::error::{PluginError, PluginResult};
use crate::types::{ParameterId, ParameterValue};

/// Real-time safe write-observer, called inline with `(id, clamped value)`.
pub type ValueObserver = Box<dyn Fn(ParameterId, ParameterValue) + Send + Sync>;

/// Read-provider consulted by `get_value` before the stored value.
pub type ValueProvider = Box<dyn Fn(ParameterId) -> Option<ParameterValue> + Send + Sync>;

/// Non-real-time change observer.
pub type ChangeObserver = Box<dyn Fn(ParameterId, ParameterValue) + Send>;

/// Handle returned by [`ParameterAutomationTree::observe_changes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

impl ObserverToken {
    /// Raw value for handing across an FFI boundary.
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Rebuild a token from [`ObserverToken::as_raw`].
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Lock-free set of parameter ids with pending changes.
///
/// One bit per id in an `AtomicU64`. Any thread may mark; the consumer takes the
/// whole set at once with a single swap, so repeated writes to the same id
/// coalesce into one pending entry.
#[derive(Debug, Default)]
pub struct PendingChanges {
    mask: AtomicU64,
}

impl PendingChanges {
    /// Create an empty set.
    pub const fn new() -> Self {
        Self {
            mask: AtomicU64::new(0),
        }
    }

    /// Mark an id as changed. Ids of 64 and above are ignored.
    #[inline]
    pub fn mark(&self, id: ParameterId) {
        if id < u64::BITS {
            self.mask.fetch_or(1 << id, Ordering::AcqRel);
        }
    }

    /// Mark the first `count` ids as changed.
    pub fn mark_all(&self, count: usize) {
        let bits = if count >= u64::BITS as usize {
            u64::MAX
        } else {
            (1u64 << count) - 1
        };
        self.mask.fetch_or(bits, Ordering::AcqRel);
    }

    /// Whether any change is pending.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mask.load(Ordering::Acquire) == 0
    }

    /// Take every pending id, calling `f` for each in ascending order.
    ///
    /// Returns the number of ids drained. Allocation-free.
    #[inline]
    pub fn drain(&self, mut f: impl FnMut(ParameterId)) -> usize {
        let mut bits = self.mask.swap(0, Ordering::AcqRel);
        let count = bits.count_ones() as usize;
        while bits != 0 {
            let id = bits.trailing_zeros();
            bits &= bits - 1;
            f(id);
        }
        count
    }
}

/// One automation value cell.
struct AutomationCell {
    descriptor: &'static ParameterDescriptor,
    bits: AtomicU32,
}

impl AutomationCell {
    #[inline]
    fn load(&self) -> ParameterValue {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    #[inline]
    fn store(&self, value: ParameterValue) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }
}

/// Runtime parameter values built from a [`ParameterCatalog`].
pub struct ParameterAutomationTree {
    catalog: ParameterCatalog,
    cells: Box<[AutomationCell]>,
    /// Ids changed since the last `dispatch_notifications`.
    changed: PendingChanges,
    value_observer: Option<ValueObserver>,
    value_provider: Option<ValueProvider>,
    observers: Mutex<Vec<(ObserverToken, ChangeObserver)>>,
    next_token: AtomicU64,
    unknown_writes: AtomicU64,
    unknown_warning_logged: AtomicBool,
}

impl ParameterAutomationTree {
    /// Build a tree with every parameter at its default value.
    pub fn new(catalog: ParameterCatalog) -> PluginResult<Self> {
        catalog.validate()?;

        let cells = catalog
            .iter()
            .map(|descriptor| AutomationCell {
                descriptor,
                bits: AtomicU32::new(descriptor.default.to_bits()),
            })
            .collect();

        Ok(Self {
            catalog,
            cells,
            changed: PendingChanges::new(),
            value_observer: None,
            value_provider: None,
            observers: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
            unknown_writes: AtomicU64::new(0),
            unknown_warning_logged: AtomicBool::new(false),
        })
    }

    /// Install the write-observer.
    ///
    /// The observer runs on whichever thread calls `set_value`, including the
    /// render thread, so it must not allocate, block or lock.
    pub fn with_value_observer(
        mut self,
        observer: impl Fn(ParameterId, ParameterValue) + Send + Sync + 'static,
    ) -> Self {
        self.value_observer = Some(Box::new(observer));
        self
    }

    /// Install the read-provider.
    ///
    /// When it returns `Some`, `get_value` reports that value instead of the
    /// stored one. Same real-time rules as the write-observer.
    pub fn with_value_provider(
        mut self,
        provider: impl Fn(ParameterId) -> Option<ParameterValue> + Send + Sync + 'static,
    ) -> Self {
        self.value_provider = Some(Box::new(provider));
        self
    }

    /// The catalog this tree was built from.
    pub fn catalog(&self) -> &ParameterCatalog {
        &self.catalog
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the tree has no parameters.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Clamp and store a value, then notify the write-observer.
    ///
    /// Returns the value actually stored. An unknown id changes nothing and
    /// returns [`PluginError::UnknownParameter`]; it never panics, so this is safe
    /// to call from the render thread.
    #[inline]
    pub fn set_value(&self, id: ParameterId, value: ParameterValue) -> PluginResult<ParameterValue> {
        let Some(cell) = self.cells.get(id as usize) else {
            self.note_unknown(id);
            return Err(PluginError::UnknownParameter(id));
        };

        let clamped = cell.descriptor.clamp(value);
        cell.store(clamped);
        self.changed.mark(id);

        if let Some(observer) = &self.value_observer {
            observer(id, clamped);
        }

        Ok(clamped)
    }

    /// Current value of a parameter.
    #[inline]
    pub fn get_value(&self, id: ParameterId) -> PluginResult<ParameterValue> {
        let Some(cell) = self.cells.get(id as usize) else {
            return Err(PluginError::UnknownParameter(id));
        };

        if let Some(provider) = &self.value_provider {
            if let Some(value) = provider(id) {
                return Ok(value);
            }
        }

        Ok(cell.load())
    }

    /// Put every parameter back to its default.
    pub fn reset_to_defaults(&self) {
        for cell in self.cells.iter() {
            // Ids come from the cells themselves, so this cannot fail.
            let _ = self.set_value(cell.descriptor.id, cell.descriptor.default);
        }
    }

    /// Number of writes to unknown ids since construction.
    pub fn unknown_write_count(&self) -> u64 {
        self.unknown_writes.load(Ordering::Relaxed)
    }

    /// Register a non-real-time change observer.
    ///
    /// The callback is invoked from `dispatch_notifications` only, never from
    /// `set_value`. It must not register or remove observers itself.
    pub fn observe_changes(
        &self,
        observer: impl Fn(ParameterId, ParameterValue) + Send + 'static,
    ) -> ObserverToken {
        let token = ObserverToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        match self.observers.lock() {
            Ok(mut observers) => observers.push((token, Box::new(observer))),
            Err(poisoned) => poisoned.into_inner().push((token, Box::new(observer))),
        }
        log::debug!("Registered parameter observer {:?}", token);
        token
    }

    /// Remove a change observer. Returns `false` if the token is unknown.
    pub fn remove_observer(&self, token: ObserverToken) -> bool {
        let mut observers = match self.observers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = observers.len();
        observers.retain(|(t, _)| *t != token);
        before != observers.len()
    }

    /// Deliver pending changes to every registered observer.
    ///
    /// Must be called from a non-real-time context. Changes coalesce: each
    /// observer sees the latest value of every id written since the previous
    /// dispatch. Returns the number of ids delivered.
    pub fn dispatch_notifications(&self) -> usize {
        if self.changed.is_empty() {
            return 0;
        }

        let observers = match self.observers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        self.changed.drain(|id| {
            let Ok(value) = self.get_value(id) else {
                return;
            };
            for (_, observer) in observers.iter() {
                observer(id, value);
            }
        })
    }

    fn note_unknown(&self, id: ParameterId) {
        self.unknown_writes.fetch_add(1, Ordering::Relaxed);
        if !self.unknown_warning_logged.swap(true, Ordering::Relaxed) {
            log::warn!(
                "Ignoring write to unknown parameter id {} (catalog has {} parameters). \
                 This warning will only appear once per instance.",
                id,
                self.cells.len()
            );
        }
    }
}

impl std::fmt::Debug for ParameterAutomationTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterAutomationTree")
            .field("parameters", &self.cells.len())
            .field("has_value_observer", &self.value_observer.is_some())
            .field("has_value_provider", &self.value_provider.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EffectParameter;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{mpsc, Arc};
    use std::thread;

    fn tree() -> ParameterAutomationTree {
        ParameterAutomationTree::new(ParameterCatalog::effect()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let tree = tree();
        for descriptor in ParameterCatalog::effect().iter() {
            assert_eq!(tree.get_value(descriptor.id).unwrap(), descriptor.default);
        }
    }

    #[test]
    fn test_set_then_get_is_clamped() {
        let tree = tree();
        let probes = [-1.0e6, -13.0, -1.0, 0.0, 0.3, 0.95, 1.0, 7.5, 12.0, 500.0, 1.0e6];
        for descriptor in ParameterCatalog::effect().iter() {
            for &v in &probes {
                let stored = tree.set_value(descriptor.id, v).unwrap();
                let expected = v.clamp(descriptor.min, descriptor.max);
                assert_eq!(stored, expected);
                assert_eq!(tree.get_value(descriptor.id).unwrap(), expected);
            }
        }
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let tree = tree();
        let before: Vec<_> = (0..8).map(|id| tree.get_value(id).unwrap()).collect();

        assert_eq!(
            tree.set_value(8, 1.0).unwrap_err(),
            PluginError::UnknownParameter(8)
        );
        assert!(tree.set_value(u32::MAX, 1.0).is_err());
        assert!(tree.get_value(8).is_err());
        assert_eq!(tree.unknown_write_count(), 2);

        let after: Vec<_> = (0..8).map(|id| tree.get_value(id).unwrap()).collect();
        assert_eq!(before, after);
        assert_eq!(tree.dispatch_notifications(), 0);
    }

    #[test]
    fn test_value_observer_sees_clamped_value() {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let tree = tree().with_value_observer(move |id, v| {
            tx.lock().unwrap().send((id, v)).unwrap();
        });

        tree.set_value(EffectParameter::DelayFeedback.id(), 3.0).unwrap();
        assert_eq!(rx.try_recv().unwrap(), (1, 0.95));
    }

    #[test]
    fn test_value_provider_overrides_stored_value() {
        let tree = tree().with_value_provider(|id| (id == 0).then_some(1234.0));
        assert_eq!(tree.get_value(0).unwrap(), 1234.0);
        assert_eq!(tree.get_value(1).unwrap(), 0.4);
    }

    #[test]
    fn test_observers_only_run_on_dispatch() {
        let tree = tree();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let token = tree.observe_changes(move |id, v| sink.lock().unwrap().push((id, v)));

        tree.set_value(0, 500.0).unwrap();
        tree.set_value(0, 600.0).unwrap();
        tree.set_value(7, 0.9).unwrap();
        assert!(seen.lock().unwrap().is_empty());

        assert_eq!(tree.dispatch_notifications(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![(0, 600.0), (7, 0.9)]);

        assert!(tree.remove_observer(token));
        assert!(!tree.remove_observer(token));
        tree.set_value(0, 700.0).unwrap();
        tree.dispatch_notifications();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_reset_to_defaults() {
        let tree = tree();
        tree.set_value(3, 0.0).unwrap();
        tree.set_value(6, -12.0).unwrap();
        tree.reset_to_defaults();
        assert_eq!(tree.get_value(3).unwrap(), 0.7);
        assert_eq!(tree.get_value(6).unwrap(), 12.0);
    }

    #[test]
    fn test_pending_changes_drain_in_order() {
        let pending = PendingChanges::new();
        pending.mark(5);
        pending.mark(1);
        pending.mark(5);
        pending.mark(64);

        let mut ids = Vec::new();
        assert_eq!(pending.drain(|id| ids.push(id)), 2);
        assert_eq!(ids, vec![1, 5]);
        assert!(pending.is_empty());

        pending.mark_all(8);
        assert_eq!(pending.drain(|_| {}), 8);
        pending.mark_all(64);
        assert_eq!(pending.drain(|_| {}), 64);
    }

    #[test]
    fn test_concurrent_writes_never_tear() {
        let tree = Arc::new(tree());
        let feedback = EffectParameter::DelayFeedback.id();
        let written = [0.4f32, 0.1, 0.9];

        let writer = {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for i in 0..1000 {
                    tree.set_value(feedback, written[i % written.len()]).unwrap();
                }
            })
        };

        let reads = AtomicUsize::new(0);
        for _ in 0..1000 {
            let v = tree.get_value(feedback).unwrap();
            assert!(written.contains(&v), "torn or foreign value {}", v);
            reads.fetch_add(1, Ordering::Relaxed);
        }

        writer.join().unwrap();
        assert_eq!(reads.load(Ordering::Relaxed), 1000);
        assert!(written.contains(&tree.get_value(feedback).unwrap()));
    }
}
