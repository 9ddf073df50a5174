//! Registry of live VM instances keyed by handle
//!
//! Slots live in an arena guarded by one lock. A released slot goes on a free
//! list and is handed out again only by a later `create`, so a handle never
//! refers to two live instances at once. Each instance has its own lock, so
//! work on different handles does not serialize on the arena.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::debug;

use super::config::VmConfig;
use super::error::{VmError, VmResult};
use super::Vm;

/// Opaque identifier of a VM instance in a [`Registry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    /// Rebuild a handle from the number a host was given
    ///
    /// A number that was never handed out is simply an invalid handle.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Handle(raw)
    }

    /// The number to pass across a host boundary
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
struct Slots {
    entries: Vec<Option<Arc<Mutex<Vm>>>>,
    free: Vec<u32>,
}

/// An arena of VM instances
#[derive(Default)]
pub struct Registry {
    slots: Mutex<Slots>,
    config: VmConfig,
    /// Slots beyond the `u32` handle space; lowered in tests
    slot_limit: Option<usize>,
}

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Registry {
    /// Create an empty registry whose instances use `config`
    #[must_use]
    pub fn new(config: VmConfig) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            config,
            slot_limit: None,
        }
    }

    #[cfg(test)]
    fn with_slot_limit(limit: usize) -> Self {
        Self {
            slot_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Create a VM instance and return its handle
    pub fn create(&self) -> VmResult<Handle> {
        self.insert(Vm::with_config(self.config.clone()))
    }

    /// Register an existing instance and return its handle
    ///
    /// Fails with [`VmError::RegistryFull`] once every `u32` handle is live.
    pub fn insert(&self, vm: Vm) -> VmResult<Handle> {
        let vm = Arc::new(Mutex::new(vm));
        let mut slots = lock(&self.slots);
        let handle = match slots.free.pop() {
            Some(index) => {
                slots.entries[index as usize] = Some(vm);
                Handle(index)
            }
            None => {
                let live = slots.entries.len();
                let index = u32::try_from(live)
                    .ok()
                    .filter(|_| self.slot_limit.map_or(true, |limit| live < limit))
                    .ok_or(VmError::RegistryFull { live })?;
                slots.entries.push(Some(vm));
                Handle(index)
            }
        };
        debug!(%handle, "vm created");
        Ok(handle)
    }

    /// Release an instance; its handle becomes invalid
    pub fn release(&self, handle: Handle) -> VmResult<()> {
        let mut slots = lock(&self.slots);
        let released = slots
            .entries
            .get_mut(handle.index())
            .and_then(Option::take);
        if released.is_none() {
            return Err(VmError::InvalidHandle(handle));
        }
        slots.free.push(handle.0);
        debug!(%handle, "vm released");
        Ok(())
    }

    /// Returns the shared instance behind a handle
    pub fn get(&self, handle: Handle) -> VmResult<Arc<Mutex<Vm>>> {
        lock(&self.slots)
            .entries
            .get(handle.index())
            .and_then(Option::clone)
            .ok_or(VmError::InvalidHandle(handle))
    }

    /// Run `f` with exclusive access to the instance behind a handle
    ///
    /// The arena lock is released before `f` runs.
    pub fn with_vm<R>(&self, handle: Handle, f: impl FnOnce(&mut Vm) -> VmResult<R>) -> VmResult<R> {
        let vm = self.get(handle)?;
        let mut guard = lock(&*vm);
        f(&mut guard)
    }

    /// Returns true if the handle refers to a live instance
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        matches!(lock(&self.slots).entries.get(handle.index()), Some(Some(_)))
    }

    /// Returns the number of live instances
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.slots).entries.iter().flatten().count()
    }

    /// Returns true if no instance is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The process-wide registry used by [`crate::host`]
pub fn global() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::default)
}
