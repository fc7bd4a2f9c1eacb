//! ControlRegistry — shared map of per-target runtime state.
//!
//! Reads (`get`, `keys`, `snapshot`) share the lock; every mutation takes
//! it exclusively. Control signals are sent with `try_send` while the
//! write lock is held, so no sender clone ever escapes the registry and a
//! `delete` closes the channel as part of the removal.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use pidscale_core::{TargetConfig, TargetKey};

use crate::error::{StateError, StateResult};
use crate::mask::{ChangeMask, diff};

/// Inbox size of each control loop.
pub const CONTROL_CHANNEL_CAPACITY: usize = 8;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Receiving half of a target's control channel, owned by its loop.
pub type ControlReceiver = mpsc::Receiver<ChangeMask>;

/// Outcome of handing a change mask to a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on the control channel.
    Sent,
    /// Inbox full; bits were folded into the entry's deferred mask and are
    /// picked up with the next queued signal.
    Deferred,
    /// The receiving loop is gone.
    Closed,
}

/// Result of [`ControlRegistry::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub mask: ChangeMask,
    /// `None` when nothing changed and no signal was sent.
    pub delivery: Option<Delivery>,
}

/// Runtime state for one managed target.
#[derive(Debug)]
pub struct TargetState {
    config: TargetConfig,
    control: mpsc::Sender<ChangeMask>,
    deferred: ChangeMask,
    generation: u64,
}

impl TargetState {
    /// Create the state and the control channel the owning loop listens on.
    pub fn new(config: TargetConfig) -> (Self, ControlReceiver) {
        let (control, rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let state = Self {
            config,
            control,
            deferred: ChangeMask::NONE,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        };
        (state, rx)
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    /// Identifies this entry; unique across every state ever created, so a
    /// re-registered key never shares it with the entry it replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Diff against `next` and commit every group that differs.
    pub fn apply(&mut self, next: &TargetConfig) -> ChangeMask {
        let mask = diff(&self.config, next);
        if mask.contains(ChangeMask::TARGET) {
            self.config.target = next.target.clone();
        }
        if mask.contains(ChangeMask::PID) {
            self.config.pid = next.pid.clone();
        }
        if mask.contains(ChangeMask::KAFKA) {
            self.config.kafka = next.kafka.clone();
        }
        if mask.contains(ChangeMask::INTERVAL) {
            self.config.interval = next.interval;
        }
        if mask.contains(ChangeMask::COOLDOWN) {
            self.config.cooldown = next.cooldown;
        }
        mask
    }

    /// Hand `mask` to the owning loop without blocking.
    pub fn signal(&mut self, mask: ChangeMask) -> Delivery {
        match self.control.try_send(mask) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(mask)) => {
                self.deferred |= mask;
                Delivery::Deferred
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Drain the bits that could not be queued.
    pub fn take_deferred(&mut self) -> ChangeMask {
        std::mem::take(&mut self.deferred)
    }
}

/// Concurrency-safe map from target key to [`TargetState`].
#[derive(Clone, Default)]
pub struct ControlRegistry {
    entries: Arc<RwLock<HashMap<TargetKey, TargetState>>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `key`. Returns true if an entry was
    /// replaced; the replaced entry's channel is closed.
    pub async fn add_or_update(&self, key: &str, state: TargetState) -> bool {
        let mut entries = self.entries.write().await;
        let replaced = entries.insert(key.to_string(), state).is_some();
        debug!(key = %key, replaced, "control state stored");
        replaced
    }

    /// Snapshot of the committed configuration for `key`.
    pub async fn get(&self, key: &str) -> Option<TargetConfig> {
        let entries = self.entries.read().await;
        entries.get(key).map(|s| s.config.clone())
    }

    /// Remove `key`, closing its control channel. Returns true if it existed.
    pub async fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.write().await;
        // Dropping the entry drops the only sender.
        let existed = entries.remove(key).is_some();
        debug!(key = %key, existed, "control state removed");
        existed
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Registered keys, sorted.
    pub async fn keys(&self) -> Vec<TargetKey> {
        let entries = self.entries.read().await;
        let mut keys: Vec<_> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// All committed configurations, sorted by key.
    pub async fn snapshot(&self) -> Vec<(TargetKey, TargetConfig)> {
        let entries = self.entries.read().await;
        let mut out: Vec<_> = entries
            .iter()
            .map(|(k, s)| (k.clone(), s.config.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Run `f` against the entry for `key` under the write lock.
    pub async fn update_with<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut TargetState) -> R,
    ) -> Option<R> {
        let mut entries = self.entries.write().await;
        entries.get_mut(key).map(f)
    }

    /// Commit `next` for `key` and signal the loop with the difference.
    pub async fn apply(&self, key: &str, next: &TargetConfig) -> StateResult<Applied> {
        let applied = self
            .update_with(key, |state| {
                let mask = state.apply(next);
                if mask.is_empty() {
                    return Applied {
                        mask,
                        delivery: None,
                    };
                }
                let delivery = state.signal(mask);
                Applied {
                    mask,
                    delivery: Some(delivery),
                }
            })
            .await
            .ok_or_else(|| StateError::NotFound(key.to_string()))?;

        match applied.delivery {
            Some(Delivery::Closed) => Err(StateError::ChannelClosed(key.to_string())),
            Some(Delivery::Deferred) => {
                warn!(key = %key, mask = %applied.mask, "control inbox full, change deferred");
                Ok(applied)
            }
            _ => Ok(applied),
        }
    }

    /// Current configuration plus any deferred change bits, drained.
    ///
    /// Called by a loop after it receives a signal. Returns `None` when
    /// `key` is gone or now belongs to another generation; the deferred
    /// bits of a newer entry are left for its own loop.
    pub async fn reload(
        &self,
        key: &str,
        generation: u64,
    ) -> Option<(TargetConfig, ChangeMask)> {
        self.update_with(key, |state| {
            (state.generation == generation)
                .then(|| (state.config.clone(), state.take_deferred()))
        })
        .await
        .flatten()
    }

    /// Run `f` under the write lock if no entry for `key` exists.
    ///
    /// Lets an exiting loop clean up after itself without racing a
    /// concurrent re-registration of the same key.
    pub async fn if_vacant(&self, key: &str, f: impl FnOnce()) -> bool {
        let entries = self.entries.write().await;
        if entries.contains_key(key) {
            return false;
        }
        f();
        true
    }
}
