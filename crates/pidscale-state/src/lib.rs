//! pidscale-state — in-memory control state for pidscale.
//!
//! Holds one [`TargetState`] per managed target behind a reader/writer
//! lock, and detects which parts of a target's configuration changed
//! between two snapshots.
//!
//! # Architecture
//!
//! ```text
//! ControlRegistry (Arc<RwLock<HashMap<key, TargetState>>>)
//!   └── TargetState
//!         ├── TargetConfig          ← latest committed snapshot
//!         ├── mpsc::Sender<ChangeMask>  ← only sender of the loop's inbox
//!         └── deferred ChangeMask   ← bits that did not fit the inbox
//! ```
//!
//! The registry owns the only sender of each control channel, so removing
//! an entry closes the channel and the owning loop observes it on its next
//! receive. Nothing is persisted; state is rebuilt from the definitions at
//! startup.

pub mod error;
pub mod mask;
pub mod registry;

pub use error::{StateError, StateResult};
pub use mask::{ChangeMask, diff};
pub use registry::{
    Applied, CONTROL_CHANNEL_CAPACITY, ControlReceiver, ControlRegistry, Delivery, TargetState,
};
