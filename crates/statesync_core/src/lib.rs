//! # Statesync Core
//!
//! Server-side state tree for the statesync engine.
//!
//! This crate provides:
//! - A static feature registry and the closed set of node features
//! - The node arena with id assignment and the attach/detach lifecycle
//! - Per-node change tracking
//! - The transaction log builder and optimizer
//!
//! ## Usage
//!
//! ```
//! use statesync_core::{build, optimize, StateTree};
//!
//! let mut tree = StateTree::new();
//! let root = tree.create_element("body");
//! tree.attach_root(root).unwrap();
//! tree.set_property(root, "value", 0.0).unwrap();
//!
//! let log = optimize(&build(&mut tree));
//! assert_eq!(log.record_count(), 3); // root slot, tag, value
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attach;
mod change;
mod element;
mod error;
mod event;
pub mod feature;
mod log;
mod node;
mod tracker;
mod tree;
mod types;

pub use attach::{AttachCallback, AttachOutcome, AttachResolution, AttachResponse};
pub use change::{Change, ChangeKind, ChangeRecord};
pub use error::{CoreError, CoreResult};
pub use event::{DomEvent, FireOutcome, Listener, ListenerId};
pub use feature::{FeatureId, FeatureKind, FeatureShape, PropertyValue};
pub use log::{
    build, build_with_stats, optimize, try_optimize, BuildStats, LogGroup, TransactionLog,
};
pub use node::StateNode;
pub use tracker::ChangeTracker;
pub use tree::{StateTree, ROOT_KEY};
pub use types::{Lookup, NodeId, NodeKey, TreeId};
pub use statesync_codec::Value;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
