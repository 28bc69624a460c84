//! Read-only analyses over programs.
//!
//! - [`foreach`]: the argument walk everything else is built on
//! - [`state`]: resources, strings and memory available before a call
//! - [`features`]: executor features a program needs
//! - [`alloc`]: occupancy trackers fed by the state analysis

pub mod alloc;
pub mod features;
pub mod foreach;
pub mod state;

pub use alloc::{MemAlloc, VmaAlloc};
pub use features::{required_features, RequiredFeatures};
pub use foreach::{foreach_arg, foreach_sub_arg, ArgCtx, ArgParent};
pub use state::{analyze, Snapshot};
