//! # Statesync Testkit
//!
//! Test utilities for statesync.
//!
//! This crate provides:
//! - Property-based test generators using proptest
//! - A tree driven by generated operations
//! - Checkers for wire ordering and id assignment
//! - Sessions wired to a loopback client
//!
//! ## Usage
//!
//! ```
//! use statesync_testkit::prelude::*;
//!
//! with_session(|session| {
//!     session.with_tree(|tree| {
//!         let root = tree.create_element("body");
//!         tree.attach_root(root).unwrap();
//!     });
//!     session.sync().unwrap();
//!     assert!(session.client.with_model(|m| m.is_known(1)));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
