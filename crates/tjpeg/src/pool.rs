use crate::{decompressor::Decompressor, error::Result, library::TurboJpeg};
use std::{
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex, MutexGuard},
};

/// Idle decompressors kept for reuse.
///
/// Handles are reused last-in first-out. Every pool mutation happens under one
/// mutex held only for a push or pop; native handle creation and destruction
/// run outside it.
pub struct DecompressorPool {
    turbo: Arc<TurboJpeg>,
    idle: Mutex<Vec<Decompressor>>,
}

impl DecompressorPool {
    pub fn new(turbo: Arc<TurboJpeg>) -> Arc<Self> {
        Arc::new(DecompressorPool {
            turbo,
            idle: Mutex::new(Vec::new()),
        })
    }

    pub fn library(&self) -> &Arc<TurboJpeg> {
        &self.turbo
    }

    /// Take the most recently released decompressor, or create one.
    ///
    /// # Errors
    /// `Initialization` when the pool is empty and the native library cannot
    /// create a new handle.
    pub fn acquire(self: &Arc<Self>) -> Result<PooledDecompressor> {
        let reused = self.lock().pop();
        let decompressor = match reused {
            Some(decompressor) => decompressor,
            None => Decompressor::new(&self.turbo)?,
        };

        Ok(PooledDecompressor {
            pool: Arc::clone(self),
            decompressor: ManuallyDrop::new(decompressor),
        })
    }

    /// Put a decompressor back for reuse.
    pub fn release(&self, decompressor: Decompressor) {
        self.lock().push(decompressor);
    }

    /// Destroy every idle decompressor, newest first, and return how many there were.
    ///
    /// Decompressors currently checked out are unaffected and rejoin the
    /// (now empty) pool when released.
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.lock());
        let count = drained.len();
        for decompressor in drained.into_iter().rev() {
            drop(decompressor);
        }
        log::info!("cleared {} idle decompressors", count);
        count
    }

    pub fn idle_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Decompressor>> {
        // the vector stays consistent even if a holder panicked
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for DecompressorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecompressorPool")
            .field("library", &self.turbo.origin())
            .field("idle", &self.idle_count())
            .finish()
    }
}

/// A decompressor checked out of a [`DecompressorPool`].
///
/// Goes back to the pool when dropped or passed to [`PooledDecompressor::release`].
pub struct PooledDecompressor {
    pool: Arc<DecompressorPool>,
    // moved out exactly once, by Drop or by detach
    decompressor: ManuallyDrop<Decompressor>,
}

impl PooledDecompressor {
    /// Return the decompressor to its pool now.
    pub fn release(self) {
        drop(self);
    }

    /// Take the decompressor out of pool management; it is destroyed when dropped.
    pub fn detach(self) -> Decompressor {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so both fields are moved out once here
        unsafe {
            drop(std::ptr::read(&this.pool));
            ManuallyDrop::take(&mut this.decompressor)
        }
    }

    pub fn pool(&self) -> &Arc<DecompressorPool> {
        &self.pool
    }
}

impl Deref for PooledDecompressor {
    type Target = Decompressor;

    fn deref(&self) -> &Decompressor {
        &self.decompressor
    }
}

impl DerefMut for PooledDecompressor {
    fn deref_mut(&mut self) -> &mut Decompressor {
        &mut self.decompressor
    }
}

impl Drop for PooledDecompressor {
    fn drop(&mut self) {
        // SAFETY: the field is not touched again after this
        let decompressor = unsafe { ManuallyDrop::take(&mut self.decompressor) };
        self.pool.release(decompressor);
    }
}

impl std::fmt::Debug for PooledDecompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PooledDecompressor")
            .field(&*self.decompressor)
            .finish()
    }
}
