//! Registries of boxed provider trait objects with disposable registrations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use quarry_types::ids::RegistrationId;

struct RegistryInner<P: ?Sized> {
    entries: Vec<(RegistrationId, Arc<P>)>,
}

/// An ordered set of providers for one capability.
///
/// `register` returns a guard; dropping it (or an explicit
/// [`ProviderRegistry::unregister`]) removes the entry. Reads take a
/// snapshot in registration order, so a consumer iterating providers is
/// never affected by concurrent (de)registration.
pub struct ProviderRegistry<P: ?Sized> {
    inner: Arc<Mutex<RegistryInner<P>>>,
    next_id: Arc<AtomicU64>,
}

impl<P: ?Sized> Clone for ProviderRegistry<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<P: ?Sized> Default for ProviderRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ?Sized> ProviderRegistry<P> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_id_allocator(Arc::new(AtomicU64::new(1)))
    }

    /// Build a registry drawing ids from a shared allocator, so ids stay
    /// unique across several registries (the boundary protocol identifies
    /// registrations by id alone).
    #[must_use]
    pub fn with_id_allocator(next_id: Arc<AtomicU64>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                entries: Vec::new(),
            })),
            next_id,
        }
    }

    pub fn register(&self, provider: Arc<P>) -> Registration<P> {
        let id = RegistrationId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .entries
            .push((id, provider));
        Registration {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a registration by id. Returns whether it existed.
    pub fn unregister(&self, id: RegistrationId) -> bool {
        remove_entry(&self.inner, id)
    }

    /// Snapshot of the registered providers, in registration order.
    #[must_use]
    pub fn providers(&self) -> Vec<Arc<P>> {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .entries
            .iter()
            .map(|(_, provider)| provider.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("registry lock poisoned").entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn remove_entry<P: ?Sized>(inner: &Mutex<RegistryInner<P>>, id: RegistrationId) -> bool {
    let mut guard = inner.lock().expect("registry lock poisoned");
    let before = guard.entries.len();
    guard.entries.retain(|(entry_id, _)| *entry_id != id);
    guard.entries.len() != before
}

/// Disposable handle for one registry entry.
///
/// Dropping the handle unregisters the provider. The handle holds only a
/// weak reference, so a dropped registry never keeps dead entries alive.
#[must_use = "dropping a Registration unregisters the provider"]
pub struct Registration<P: ?Sized> {
    id: RegistrationId,
    inner: Weak<Mutex<RegistryInner<P>>>,
}

impl<P: ?Sized> Registration<P> {
    #[must_use]
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    /// Unregister now instead of at drop time.
    pub fn unregister(self) {
        drop(self);
    }
}

impl<P: ?Sized> Drop for Registration<P> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            remove_entry(&inner, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }

    struct Fixed(&'static str);

    impl Named for Fixed {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn names(registry: &ProviderRegistry<dyn Named>) -> Vec<String> {
        registry
            .providers()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    #[test]
    fn register_preserves_order() {
        let registry: ProviderRegistry<dyn Named> = ProviderRegistry::new();
        let _a = registry.register(Arc::new(Fixed("a")));
        let _b = registry.register(Arc::new(Fixed("b")));
        let _c = registry.register(Arc::new(Fixed("c")));
        assert_eq!(names(&registry), ["a", "b", "c"]);
    }

    #[test]
    fn drop_unregisters() {
        let registry: ProviderRegistry<dyn Named> = ProviderRegistry::new();
        let _a = registry.register(Arc::new(Fixed("a")));
        {
            let _b = registry.register(Arc::new(Fixed("b")));
            assert_eq!(registry.len(), 2);
        }
        assert_eq!(names(&registry), ["a"]);
    }

    #[test]
    fn explicit_unregister_by_id() {
        let registry: ProviderRegistry<dyn Named> = ProviderRegistry::new();
        let a = registry.register(Arc::new(Fixed("a")));
        let id = a.id();
        // Simulate the boundary path where only the id travels.
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id), "second removal is a no-op");
        // The guard's own drop must tolerate the entry being gone.
        drop(a);
        assert!(registry.is_empty());
    }

    #[test]
    fn shared_allocator_keeps_ids_distinct_across_registries() {
        let ids = Arc::new(AtomicU64::new(1));
        let left: ProviderRegistry<dyn Named> = ProviderRegistry::with_id_allocator(ids.clone());
        let right: ProviderRegistry<dyn Named> = ProviderRegistry::with_id_allocator(ids);
        let a = left.register(Arc::new(Fixed("a")));
        let b = right.register(Arc::new(Fixed("b")));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn registration_outliving_registry_is_harmless() {
        let registry: ProviderRegistry<dyn Named> = ProviderRegistry::new();
        let guard = registry.register(Arc::new(Fixed("a")));
        drop(registry);
        drop(guard);
    }
}
