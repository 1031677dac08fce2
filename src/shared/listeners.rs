//! Listener-Registry mit schwachen Referenzen.
//!
//! Die Registry hält nur `Weak`-Handles: ein Listener, den sonst niemand
//! mehr besitzt, wird beim nächsten Durchlauf stillschweigend entfernt.
//! Abonnenten müssen ihre `Arc`-Instanz selbst am Leben halten.

use std::sync::{Arc, Mutex, PoisonError, Weak};

pub struct ListenerRegistry<L: ?Sized> {
    entries: Mutex<Vec<Weak<L>>>,
}

impl<L: ?Sized> ListenerRegistry<L> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: &Arc<L>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|entry| entry.strong_count() > 0);
        entries.push(Arc::downgrade(listener));
    }

    /// Entfernt den Eintrag mit identischer Allokation (Pointer-Identität).
    pub fn remove(&self, listener: &Arc<L>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let target = Arc::downgrade(listener);
        entries.retain(|entry| entry.strong_count() > 0 && !Weak::ptr_eq(entry, &target));
    }

    /// Starke Referenzen auf alle noch lebenden Listener. Tote Einträge
    /// werden dabei entfernt.
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|entry| entry.strong_count() > 0);
        entries.iter().filter_map(Weak::upgrade).collect()
    }

    /// Ruft `f` für jeden lebenden Listener auf. Die Registry-Sperre ist
    /// während der Aufrufe nicht gehalten.
    pub fn notify(&self, mut f: impl FnMut(&L)) {
        for listener in self.snapshot() {
            f(&listener);
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    #[test]
    fn test_dropped_listener_is_pruned() {
        let registry: ListenerRegistry<Counter> = ListenerRegistry::new();
        let keeper = Arc::new(Counter(AtomicUsize::new(0)));
        let transient = Arc::new(Counter(AtomicUsize::new(0)));

        registry.add(&keeper);
        registry.add(&transient);
        assert_eq!(registry.len(), 2);

        drop(transient);
        registry.notify(|listener| {
            listener.0.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(registry.len(), 1);
        assert_eq!(keeper.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_by_identity() {
        let registry: ListenerRegistry<Counter> = ListenerRegistry::new();
        let first = Arc::new(Counter(AtomicUsize::new(0)));
        let second = Arc::new(Counter(AtomicUsize::new(0)));

        registry.add(&first);
        registry.add(&second);
        registry.remove(&first);

        registry.notify(|listener| {
            listener.0.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(first.0.load(Ordering::SeqCst), 0);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
    }
}
