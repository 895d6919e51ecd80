// shared.rs — thread-safe handle over the mixing core

use std::sync::Arc;

use parking_lot::Mutex;

use crate::dma::SoundCore;
use crate::params::SoundParams;

/// Cloneable handle sharing one [`SoundCore`] behind a mutex. The core has
/// no internal locking; everything from frame updates to raw stream pushes
/// serializes here, so producers on other threads can feed
/// [`SoundCore::raw_audio`] while the frame loop runs update.
#[derive(Clone)]
pub struct SoundShared {
    core: Arc<Mutex<SoundCore>>,
}

impl SoundShared {
    pub fn new(params: SoundParams) -> Self {
        Self {
            core: Arc::new(Mutex::new(SoundCore::new(params))),
        }
    }

    /// Runs `f` with the core locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut SoundCore) -> R) -> R {
        f(&mut self.core.lock())
    }
}
