//! # Statesync Engine
//!
//! Sessions around a state tree.
//!
//! This crate provides:
//! - [`Session`]: one lock per tree, the flush pipeline and verbatim resend
//! - The RPC [`Dispatcher`] and the built-in handlers
//! - The per-tag [`MethodRegistry`] for template methods
//! - The session [`ErrorFeed`]
//! - The [`DiffTransport`] abstraction with mock and loopback transports
//!
//! ## Usage
//!
//! ```
//! use statesync_engine::{Loopback, Session, SessionConfig};
//!
//! let session = Session::new(SessionConfig::default());
//! session.with_tree(|tree| {
//!     let root = tree.create_element("body");
//!     tree.attach_root(root)
//! }).unwrap();
//!
//! let client = Loopback::new();
//! let report = session.flush_and_send(&client).unwrap();
//! assert_eq!(report.delivered, vec![1]);
//! assert_eq!(client.render()["document"]["root"]["elementData"]["tag"], "body");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dispatcher;
mod error;
mod error_feed;
pub mod handlers;
mod methods;
mod session;
mod transport;

pub use config::{RetryConfig, SessionConfig};
pub use dispatcher::{Dispatched, Dispatcher, RejectReason, RpcHandler, RpcOutcome};
pub use error::{EngineError, EngineResult};
pub use error_feed::{ErrorFeed, SessionError};
pub use methods::{Method, MethodArg, MethodRegistry, MethodRegistryBuilder};
pub use session::{FlushOutput, FlushStats, SendReport, Session, SessionId, TreeGuard};
pub use transport::{DiffTransport, Loopback, MockTransport};
