//! Binding server nodes to elements that already exist on the client.
//!
//! The server cannot know whether the client's DOM already holds an
//! element, so it creates a placeholder, announces it as a virtual child,
//! and waits for the client to report which element (if any) it bound.

use crate::error::CoreResult;
use crate::tree::StateTree;
use crate::types::{Lookup, NodeId, NodeKey};
use std::fmt;

/// Callback receiving the client's answer.
pub type AttachCallback = Box<dyn FnOnce(&mut StateTree, AttachOutcome) -> CoreResult<()> + Send>;

/// What the client found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// No matching element exists on the client.
    NotFound,
    /// The placeholder is now bound to the client element.
    Attached {
        /// The placeholder node.
        node: NodeKey,
        /// Position of the element among its siblings.
        index: usize,
    },
    /// The element was already bound to another server node.
    Existing {
        /// The node already bound to the element.
        node: NodeKey,
        /// Position of the element among its siblings.
        index: usize,
    },
}

/// The client's answer to an attach request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachResponse {
    /// Id of the placeholder the request was made for.
    pub requested: NodeId,
    /// Id of the node bound to the element, or `-1` when nothing was found.
    pub assigned: i64,
    /// Tag of the element found.
    pub tag: String,
    /// Position of the element among its siblings, when known.
    pub index: Option<usize>,
}

/// How an attach response was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachResolution {
    /// The callback ran.
    Completed,
    /// No request is pending for that placeholder under that parent.
    UnknownRequest,
    /// The reported tag differs from the requested one. The request stays
    /// pending.
    TagMismatch,
}

pub(crate) struct PendingAttach {
    parent: NodeKey,
    tag: String,
    index: usize,
    callback: AttachCallback,
}

impl fmt::Debug for PendingAttach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAttach")
            .field("parent", &self.parent)
            .field("tag", &self.tag)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl StateTree {
    /// Asks the client to bind an existing `tag` element under `parent`,
    /// expected at `index` among its children.
    ///
    /// Returns the placeholder node, which is appended to `parent`'s virtual
    /// children so that the client learns its id.
    pub fn request_attach_existing(
        &mut self,
        parent: NodeKey,
        tag: &str,
        index: usize,
        callback: AttachCallback,
    ) -> CoreResult<NodeKey> {
        let placeholder = self.create_element(tag);
        if let Err(err) = self.append_virtual_child(parent, placeholder) {
            self.release(placeholder)?;
            return Err(err);
        }
        self.pending_attach.insert(
            placeholder,
            PendingAttach {
                parent,
                tag: tag.to_string(),
                index,
                callback,
            },
        );
        Ok(placeholder)
    }

    /// Number of attach requests waiting for an answer.
    pub fn pending_attach_count(&self) -> usize {
        self.pending_attach.len()
    }

    /// Handles the client's answer to an attach request made under `parent`.
    pub fn complete_attach_existing(
        &mut self,
        parent: NodeKey,
        response: &AttachResponse,
    ) -> CoreResult<AttachResolution> {
        let Lookup::Found(placeholder) = self.get_by_id(response.requested) else {
            return Ok(AttachResolution::UnknownRequest);
        };
        match self.pending_attach.get(&placeholder) {
            Some(pending) if pending.parent == parent => {
                if pending.tag != response.tag {
                    return Ok(AttachResolution::TagMismatch);
                }
            }
            _ => return Ok(AttachResolution::UnknownRequest),
        }
        let Some(pending) = self.pending_attach.remove(&placeholder) else {
            return Ok(AttachResolution::UnknownRequest);
        };
        let index = response.index.unwrap_or(pending.index);

        let outcome = if response.assigned < 0 {
            self.detach(placeholder)?;
            AttachOutcome::NotFound
        } else if response.assigned == i64::from(response.requested.as_u32()) {
            AttachOutcome::Attached {
                node: placeholder,
                index,
            }
        } else {
            self.detach(placeholder)?;
            let existing = u32::try_from(response.assigned)
                .ok()
                .and_then(|id| self.get_by_id(NodeId(id)).found());
            match existing {
                Some(node) => AttachOutcome::Existing { node, index },
                None => AttachOutcome::NotFound,
            }
        };
        (pending.callback)(self, outcome)?;
        Ok(AttachResolution::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn capture() -> (Arc<Mutex<Option<AttachOutcome>>>, AttachCallback) {
        let slot = Arc::new(Mutex::new(None));
        let sink = slot.clone();
        let callback: AttachCallback = Box::new(move |_, outcome| {
            *sink.lock().unwrap() = Some(outcome);
            Ok(())
        });
        (slot, callback)
    }

    fn setup() -> (StateTree, NodeKey) {
        let mut tree = StateTree::new();
        let root = tree.create_element("body");
        tree.attach_root(root).unwrap();
        (tree, root)
    }

    #[test]
    fn assigned_equal_to_requested_binds_placeholder() {
        let (mut tree, root) = setup();
        let (slot, callback) = capture();
        let placeholder = tree
            .request_attach_existing(root, "my-label", 0, callback)
            .unwrap();
        let requested = tree.node_id(placeholder).unwrap();
        assert_eq!(tree.virtual_children(root).unwrap(), vec![placeholder]);

        let resolution = tree
            .complete_attach_existing(
                root,
                &AttachResponse {
                    requested,
                    assigned: i64::from(requested.as_u32()),
                    tag: "my-label".into(),
                    index: Some(2),
                },
            )
            .unwrap();

        assert_eq!(resolution, AttachResolution::Completed);
        assert_eq!(
            *slot.lock().unwrap(),
            Some(AttachOutcome::Attached {
                node: placeholder,
                index: 2
            })
        );
        assert_eq!(tree.pending_attach_count(), 0);
    }

    #[test]
    fn not_found_detaches_placeholder() {
        let (mut tree, root) = setup();
        let (slot, callback) = capture();
        let placeholder = tree.request_attach_existing(root, "span", 0, callback).unwrap();
        let requested = tree.node_id(placeholder).unwrap();

        tree.complete_attach_existing(
            root,
            &AttachResponse {
                requested,
                assigned: -1,
                tag: "span".into(),
                index: None,
            },
        )
        .unwrap();

        assert_eq!(*slot.lock().unwrap(), Some(AttachOutcome::NotFound));
        assert!(!tree.is_registered(placeholder));
        assert!(tree.virtual_children(root).unwrap().is_empty());
    }

    #[test]
    fn other_assigned_id_reports_existing_node() {
        let (mut tree, root) = setup();
        let bound = tree.create_element("span");
        tree.append_child(root, bound).unwrap();
        let bound_id = tree.node_id(bound).unwrap();

        let (slot, callback) = capture();
        let placeholder = tree.request_attach_existing(root, "span", 0, callback).unwrap();
        let requested = tree.node_id(placeholder).unwrap();

        tree.complete_attach_existing(
            root,
            &AttachResponse {
                requested,
                assigned: i64::from(bound_id.as_u32()),
                tag: "span".into(),
                index: None,
            },
        )
        .unwrap();

        assert_eq!(
            *slot.lock().unwrap(),
            Some(AttachOutcome::Existing {
                node: bound,
                index: 0
            })
        );
        assert!(!tree.is_registered(placeholder));
    }

    #[test]
    fn tag_mismatch_and_unknown_requests() {
        let (mut tree, root) = setup();
        let (_slot, callback) = capture();
        let placeholder = tree.request_attach_existing(root, "span", 0, callback).unwrap();
        let requested = tree.node_id(placeholder).unwrap();

        let mut response = AttachResponse {
            requested,
            assigned: -1,
            tag: "div".into(),
            index: None,
        };
        assert_eq!(
            tree.complete_attach_existing(root, &response).unwrap(),
            AttachResolution::TagMismatch
        );
        assert_eq!(tree.pending_attach_count(), 1);

        response.tag = "span".into();
        assert_eq!(
            tree.complete_attach_existing(placeholder, &response).unwrap(),
            AttachResolution::UnknownRequest
        );

        response.requested = NodeId(999);
        assert_eq!(
            tree.complete_attach_existing(root, &response).unwrap(),
            AttachResolution::UnknownRequest
        );
    }
}
