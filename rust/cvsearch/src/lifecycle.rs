//! Ownership of result buffers handed out through raw pointers.
//!
//! A result crosses the C ABI as a bare `*mut i32`. The buffer stays owned by
//! the registry of the backend that produced it until the paired release
//! call, so a release can be checked against the set of live buffers instead
//! of trusting the pointer.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::MutexGuard;

use tracing::{
    debug,
    warn,
};

use crate::errors::{
    ReleaseError,
    Result,
};
use crate::selection::PADDING;

#[derive(Debug)]
pub struct ResultRegistry {
    name: &'static str,
    live: Mutex<BTreeMap<usize, Box<[i32]>>>,
}

pub static CPU_RESULTS: ResultRegistry = ResultRegistry::new("cpu");
pub static GPU_RESULTS: ResultRegistry = ResultRegistry::new("gpu");

impl ResultRegistry {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            live: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<usize, Box<[i32]>>> {
        // The map is never left half-updated, a poisoned lock is still usable.
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Takes ownership of `data` and returns the pointer to hand out.
    ///
    /// Empty results still get a distinct one-slot allocation so that every
    /// live handle has its own address.
    pub fn register(&self, data: Vec<i32>) -> *mut i32 {
        let mut data = data;
        if data.is_empty() {
            data.push(PADDING);
        }
        let mut boxed = data.into_boxed_slice();
        let ptr = boxed.as_mut_ptr();
        let len = boxed.len();
        self.lock().insert(ptr as usize, boxed);
        debug!("Registered {} result buffer {:p} ({} slots)", self.name, ptr, len);
        ptr
    }

    /// Frees a buffer previously returned by [`Self::register`].
    pub fn release(&self, ptr: *const i32) -> Result<()> {
        if ptr.is_null() {
            return Err(ReleaseError::NullHandle.into());
        }
        match self.lock().remove(&(ptr as usize)) {
            Some(buffer) => {
                debug!(
                    "Released {} result buffer {:p} ({} slots)",
                    self.name,
                    ptr,
                    buffer.len()
                );
                Ok(())
            }
            None => {
                warn!("Release of unknown {} result handle {:p}", self.name, ptr);
                Err(ReleaseError::UnknownHandle {
                    address: ptr as usize,
                }
                .into())
            }
        }
    }

    /// Number of buffers handed out and not yet released.
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
