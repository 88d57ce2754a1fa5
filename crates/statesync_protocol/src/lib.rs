//! # Statesync Protocol
//!
//! Wire format between a state tree and its client.
//!
//! This crate provides:
//! - Outbound wire changes and numbered payloads
//! - The diff encoder turning transaction logs into wire changes
//! - Inbound RPC envelopes and their typed payloads
//! - A reference client model that replays payloads
//!
//! ## Usage
//!
//! ```
//! use statesync_core::{build, StateTree};
//! use statesync_protocol::{encode_payload, ClientModel};
//!
//! let mut tree = StateTree::new();
//! let root = tree.create_element("body");
//! tree.attach_root(root).unwrap();
//!
//! let payload = encode_payload(1, &build(&mut tree));
//! let mut client = ClientModel::strict();
//! client.apply_payload(&payload).unwrap();
//! assert_eq!(client.map_node(0, 0, "root"), Some(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod encoder;
mod error;
pub mod rpc;
mod wire;

pub use client::{ClientModel, ID_KEY};
pub use encoder::{encode, encode_payload, encode_record};
pub use error::{ProtocolError, ProtocolResult};
pub use rpc::{
    decode_batch, AttachExistingPayload, EventPayload, InboundValue, MethodInvokePayload,
    PropertySyncPayload, RpcEnvelope,
};
pub use wire::{ChangeType, EncodedPayload, WireChange};
