//! Process-wide manager handle for the outermost layer of an application.
//!
//! Library code should take a `&mut PlaybackManager`. The handle here is
//! for hosts that need one manager reachable from anywhere on the audio
//! thread. It is thread-local: the manager owns non-`Send` device handles
//! and all bookkeeping stays on one thread.
//!
//! Lifecycle: [`install`] or the first [`with_or_init`] creates it,
//! [`shutdown`] tears the pool down and empties the slot.

use std::cell::RefCell;

use crate::error::{Result, SoundError};
use crate::manager::PlaybackManager;

thread_local! {
    static MANAGER: RefCell<Option<PlaybackManager>> = const { RefCell::new(None) };
}

/// Put `manager` in the slot, returning whatever was there.
pub fn install(manager: PlaybackManager) -> Result<Option<PlaybackManager>> {
    MANAGER.with(|slot| {
        let mut slot = slot.try_borrow_mut().map_err(|_| SoundError::ManagerBusy)?;
        Ok(slot.replace(manager))
    })
}

pub fn is_installed() -> bool {
    MANAGER.with(|slot| slot.try_borrow().map(|s| s.is_some()).unwrap_or(true))
}

/// Run `f` against the installed manager.
pub fn with<R>(f: impl FnOnce(&mut PlaybackManager) -> R) -> Result<R> {
    MANAGER.with(|slot| {
        let mut slot = slot.try_borrow_mut().map_err(|_| SoundError::ManagerBusy)?;
        let manager = slot.as_mut().ok_or(SoundError::NotInitialized)?;
        Ok(f(manager))
    })
}

/// Like [`with`], constructing the manager with `init` on first access.
pub fn with_or_init<R>(
    init: impl FnOnce() -> Result<PlaybackManager>,
    f: impl FnOnce(&mut PlaybackManager) -> R,
) -> Result<R> {
    MANAGER.with(|slot| {
        let mut slot = slot.try_borrow_mut().map_err(|_| SoundError::ManagerBusy)?;
        if slot.is_none() {
            *slot = Some(init()?);
        }
        match slot.as_mut() {
            Some(manager) => Ok(f(manager)),
            None => Err(SoundError::NotInitialized),
        }
    })
}

/// Tear down the installed manager. Returns false if none was installed.
pub fn shutdown() -> Result<bool> {
    MANAGER.with(|slot| {
        let mut slot = slot.try_borrow_mut().map_err(|_| SoundError::ManagerBusy)?;
        match slot.take() {
            Some(mut manager) => {
                manager.shutdown();
                Ok(true)
            }
            None => Ok(false),
        }
    })
}
