//! Shared ownership of objects that are captured by render commands, with a liveness registry for non-owning observers.
//!
//! A [`Ref<T>`] is a strong, atomically counted reference. The object is destroyed exactly when the last `Ref` to it
//! is dropped, on whatever thread that happens. Every object created through a [`LiveRegistry`] is registered in it
//! for as long as it lives, so a [`WeakRef<T>`] can answer whether its object still exists without keeping it alive.
//!
//! Cloning or dropping a `Ref` that is not the last one never touches the registry. Only creation and destruction
//! lock one of the registry's shards.
//!
//! # Example
//! ```
//! # use tandem::*;
//! let registry = LiveRegistry::new();
//! let texture = registry.create(String::from("albedo"));
//! let observer = texture.downgrade();
//! assert!(observer.is_valid());
//!
//! drop(texture);
//! assert!(!observer.is_valid());
//! ```

use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

#[derive(Debug)]
struct RegistryInner {
    /// Address of every live object, tagged with its id.
    live: DashMap<usize, u64>,
    next_id: AtomicU64,
}

/// Registry of all live objects created through it. Cheap to clone, all clones share the same registry.
///
/// Entries are keyed by address and tagged with a unique id, so an address reused by a newer object is never mistaken
/// for the object that lived there before.
#[derive(Debug, Clone)]
pub struct LiveRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for LiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        LiveRegistry {
            inner: Arc::new(RegistryInner {
                live: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Create a new shared object registered in this registry.
    pub fn create<T: Send + Sync>(&self, value: T) -> Ref<T> {
        Ref::new(self, value)
    }

    /// Whether any live object currently occupies `address`.
    pub fn is_live(&self, address: *const ()) -> bool {
        self.inner.live.contains_key(&(address as usize))
    }

    /// Amount of live objects in this registry.
    pub fn live_count(&self) -> usize {
        self.inner.live.len()
    }

    fn allocate_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn register(&self, address: usize, id: u64) {
        self.inner.live.insert(address, id);
    }

    fn unregister(&self, address: usize, id: u64) {
        let removed = self.inner.live.remove_if(&address, |_, current| *current == id);
        debug_assert!(removed.is_some(), "live registry entry does not match the destroyed object");
    }

    fn contains(&self, address: usize, id: u64) -> bool {
        self.inner
            .live
            .get(&address)
            .map_or(false, |entry| *entry == id)
    }
}

struct RefInner<T> {
    value: T,
    id: u64,
    registry: LiveRegistry,
}

impl<T> RefInner<T> {
    fn address(&self) -> usize {
        self as *const Self as usize
    }
}

impl<T> Drop for RefInner<T> {
    fn drop(&mut self) {
        self.registry.unregister(self.address(), self.id);
        #[cfg(feature = "log-objects")]
        trace!("Destroying shared object {:#x} ({})", self.address(), std::any::type_name::<T>());
    }
}

/// Strong shared reference to an object registered in a [`LiveRegistry`].
///
/// Capture a `Ref` by value in a render command to keep the object alive until the command has run.
pub struct Ref<T> {
    inner: Arc<RefInner<T>>,
}

impl<T: Send + Sync> Ref<T> {
    /// Create a new shared object and register it in `registry`.
    pub fn new(registry: &LiveRegistry, value: T) -> Self {
        let id = registry.allocate_id();
        let inner = Arc::new(RefInner {
            value,
            id,
            registry: registry.clone(),
        });
        registry.register(inner.address(), id);
        #[cfg(feature = "log-objects")]
        trace!("Created shared object {:#x} ({})", inner.address(), std::any::type_name::<T>());
        Ref {
            inner,
        }
    }
}

impl<T> Ref<T> {
    /// Create a non-owning observer of this object.
    pub fn downgrade(&self) -> WeakRef<T> {
        WeakRef {
            weak: Arc::downgrade(&self.inner),
            address: self.inner.address(),
            id: self.inner.id,
            registry: self.inner.registry.clone(),
        }
    }

    /// Amount of strong references to this object, including this one.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether two references point to the same object.
    pub fn ptr_eq(&self, other: &Ref<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Address this object is registered under in the [`LiveRegistry`].
    pub fn as_ptr(&self) -> *const () {
        self.inner.address() as *const ()
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Ref {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Deref for Ref<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner.value
    }
}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Eq for Ref<T> {}

impl<T: Debug> Debug for Ref<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ref")
            .field("value", &self.inner.value)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// Non-owning observer of an object held by [`Ref`]s.
///
/// [`WeakRef::is_valid()`] is a best-effort answer: it is only accurate at the instant of the check, and the last
/// `Ref` may be dropped on another thread right after it returned `true`. Use [`WeakRef::upgrade()`] to actually use
/// the object, which either keeps it alive or fails.
pub struct WeakRef<T> {
    weak: Weak<RefInner<T>>,
    address: usize,
    id: u64,
    registry: LiveRegistry,
}

impl<T> WeakRef<T> {
    /// Whether the observed object is alive right now.
    pub fn is_valid(&self) -> bool {
        self.registry.contains(self.address, self.id)
    }

    /// Obtain a strong reference if the object is still alive.
    pub fn upgrade(&self) -> Option<Ref<T>> {
        self.weak.upgrade().map(|inner| Ref {
            inner,
        })
    }
}

impl<T> Clone for WeakRef<T> {
    fn clone(&self) -> Self {
        WeakRef {
            weak: self.weak.clone(),
            address: self.address,
            id: self.id,
            registry: self.registry.clone(),
        }
    }
}

impl<T> Debug for WeakRef<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakRef")
            .field("address", &format_args!("{:#x}", self.address))
            .field("valid", &self.is_valid())
            .finish()
    }
}

static_assertions::assert_impl_all!(LiveRegistry: Send, Sync, Clone);
static_assertions::assert_impl_all!(Ref<u32>: Send, Sync, Clone);
static_assertions::assert_impl_all!(WeakRef<u32>: Send, Sync, Clone);
