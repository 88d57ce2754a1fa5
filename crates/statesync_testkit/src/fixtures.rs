//! Test fixtures and session helpers.

use crate::generators::{TreeOperation, HANDLER_NAMES, PROPERTY_NAMES, TAGS};
use statesync_core::{CoreResult, NodeId, NodeKey, StateTree, TransactionLog};
use statesync_engine::{EngineResult, Loopback, SendReport, Session, SessionConfig};
use statesync_protocol::{encode, ClientModel, ProtocolResult, WireChange};
use std::collections::{HashMap, HashSet};

/// A tree driven by generated operations.
///
/// Starts with an attached `body` root. Every element the operations create
/// is remembered, attached or not, so later operations can target it.
#[derive(Debug)]
pub struct ScriptedTree {
    /// The tree.
    pub tree: StateTree,
    nodes: Vec<NodeKey>,
}

impl ScriptedTree {
    /// Creates a tree with an attached root.
    pub fn new() -> Self {
        let mut tree = StateTree::new();
        let root = tree.create_element("body");
        tree.attach_root(root).expect("fresh tree accepts a root");
        Self {
            tree,
            nodes: vec![root],
        }
    }

    /// The root node.
    pub fn root(&self) -> NodeKey {
        self.nodes[0]
    }

    /// Every node created so far, the root first.
    pub fn nodes(&self) -> &[NodeKey] {
        &self.nodes
    }

    fn node(&self, position: usize) -> NodeKey {
        self.nodes[position % self.nodes.len()]
    }

    fn element(&mut self, tag: usize) -> NodeKey {
        let node = self.tree.create_element(TAGS[tag % TAGS.len()]);
        self.nodes.push(node);
        node
    }

    /// Applies one operation. Returns whether it changed the tree.
    ///
    /// Operations the tree refuses, such as moving a node under its own
    /// descendant, are skipped. [`TreeOperation::Flush`] is left to the
    /// caller and always returns false.
    pub fn apply(&mut self, op: &TreeOperation) -> bool {
        self.try_apply(op).unwrap_or(false)
    }

    fn try_apply(&mut self, op: &TreeOperation) -> CoreResult<bool> {
        match op {
            TreeOperation::SetProperty { node, name, value } => {
                let node = self.node(*node);
                self.tree.set_property(node, property(*name), value.clone())?;
            }
            TreeOperation::SetNodeProperty { node, name, tag } => {
                let node = self.node(*node);
                let child = self.element(*tag);
                self.tree.set_property_node(node, property(*name), child)?;
            }
            TreeOperation::RemoveProperty { node, name } => {
                let node = self.node(*node);
                return Ok(self.tree.remove_property(node, property(*name))?.is_some());
            }
            TreeOperation::InsertChild { parent, index, tag } => {
                let parent = self.node(*parent);
                let len = self.tree.children(parent)?.len();
                let child = self.element(*tag);
                self.tree.insert_child(parent, index % (len + 1), child)?;
            }
            TreeOperation::RemoveChild { parent, index } => {
                let parent = self.node(*parent);
                let len = self.tree.children(parent)?.len();
                if len == 0 {
                    return Ok(false);
                }
                self.tree.remove_child(parent, index % len)?;
            }
            TreeOperation::MoveChild { node, parent } => {
                let node = self.node(*node);
                let parent = self.node(*parent);
                if node == self.root() || node == parent {
                    return Ok(false);
                }
                self.tree.detach(node)?;
                self.tree.append_child(parent, node)?;
            }
            TreeOperation::ClearChildren { parent } => {
                let parent = self.node(*parent);
                return Ok(!self.tree.remove_all_children(parent)?.is_empty());
            }
            TreeOperation::SetHandlers { node, count } => {
                let node = self.node(*node);
                let names: Vec<String> = HANDLER_NAMES
                    .iter()
                    .take(*count)
                    .map(|name| name.to_string())
                    .collect();
                self.tree.set_client_handlers(node, &names)?;
            }
            TreeOperation::Flush => return Ok(false),
        }
        Ok(true)
    }

    /// Ids currently held by the remembered nodes.
    pub fn assigned_ids(&self) -> Vec<(NodeKey, NodeId)> {
        self.nodes
            .iter()
            .filter_map(|key| self.tree.node_id(*key).map(|id| (*key, id)))
            .collect()
    }
}

impl Default for ScriptedTree {
    fn default() -> Self {
        Self::new()
    }
}

fn property(name: usize) -> &'static str {
    PROPERTY_NAMES[name % PROPERTY_NAMES.len()]
}

/// Checks that every wire change targets a node the client already knows.
///
/// The client knows the document, and every node referenced by an earlier
/// `putNode` or `listInsertNode(s)`, in this payload or a previous one.
#[derive(Debug, Clone)]
pub struct OrderingChecker {
    known: HashSet<u32>,
}

impl OrderingChecker {
    /// Creates a checker that only knows the document.
    pub fn new() -> Self {
        let mut known = HashSet::new();
        known.insert(NodeId::DOCUMENT.as_u32());
        Self { known }
    }

    /// Checks one payload's changes, in order.
    pub fn check(&mut self, changes: &[WireChange]) -> Result<(), String> {
        for (position, change) in changes.iter().enumerate() {
            if !self.known.contains(&change.id) {
                return Err(format!(
                    "change {position} targets node {} before it was announced",
                    change.id
                ));
            }
            if change.kind.carries_nodes() {
                match &change.value {
                    Some(serde_json::Value::Array(items)) => {
                        self.known
                            .extend(items.iter().filter_map(|v| v.as_u64()).map(|v| v as u32));
                    }
                    Some(value) => {
                        if let Some(id) = value.as_u64() {
                            self.known.insert(id as u32);
                        }
                    }
                    None => return Err(format!("change {position} carries no node")),
                }
            }
        }
        Ok(())
    }
}

impl Default for OrderingChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks which node each id was handed to.
#[derive(Debug, Clone, Default)]
pub struct IdLedger {
    owners: HashMap<NodeId, NodeKey>,
}

impl IdLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current assignments and fails if an id ever moved to
    /// another node.
    pub fn observe(&mut self, assigned: &[(NodeKey, NodeId)]) -> Result<(), String> {
        for (key, id) in assigned {
            match self.owners.insert(*id, *key) {
                Some(previous) if previous != *key => {
                    return Err(format!("{id} was assigned to {previous} and then to {key}"));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Replays logs into a fresh client model.
pub fn replay<'a>(
    logs: impl IntoIterator<Item = &'a TransactionLog>,
    strict: bool,
) -> ProtocolResult<ClientModel> {
    let mut client = if strict {
        ClientModel::strict()
    } else {
        ClientModel::new()
    };
    for log in logs {
        client.apply(&encode(log))?;
    }
    Ok(client)
}

/// A session wired to a loopback client.
pub struct TestSession {
    /// The session.
    pub session: Session,
    /// The client end.
    pub client: Loopback,
}

impl TestSession {
    /// Creates a session with default configuration.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Creates a session with the given configuration.
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            session: Session::new(config),
            client: Loopback::new(),
        }
    }

    /// Flushes and delivers to the client.
    pub fn sync(&self) -> EngineResult<SendReport> {
        self.session.flush_and_send(&self.client)
    }

    /// The client's rendered document.
    pub fn rendered(&self) -> serde_json::Value {
        self.client.render()
    }
}

impl Default for TestSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestSession {
    type Target = Session;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

/// Runs `f` with a fresh session wired to a loopback client.
pub fn with_session<F, R>(f: F) -> R
where
    F: FnOnce(&TestSession) -> R,
{
    let session = TestSession::new();
    f(&session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use statesync_codec::Value;
    use statesync_protocol::ChangeType;

    #[test]
    fn scripted_tree_wraps_positions() {
        let mut scripted = ScriptedTree::new();
        assert!(scripted.apply(&TreeOperation::InsertChild {
            parent: 7,
            index: 3,
            tag: 1
        }));
        assert_eq!(scripted.nodes().len(), 2);
        assert_eq!(scripted.tree.children(scripted.root()).unwrap().len(), 1);

        assert!(scripted.apply(&TreeOperation::SetProperty {
            node: 3,
            name: 0,
            value: Value::Integer(1)
        }));
        assert!(!scripted.apply(&TreeOperation::MoveChild { node: 0, parent: 1 }));
        assert!(!scripted.apply(&TreeOperation::Flush));
    }

    #[test]
    fn ordering_checker_flags_unannounced_targets() {
        let change = |id, kind, value| WireChange {
            id,
            kind,
            feat: 2,
            key: "x".into(),
            index: None,
            value,
        };
        let mut checker = OrderingChecker::new();
        assert!(checker
            .check(&[
                change(0, ChangeType::PutNode, Some(serde_json::json!(1))),
                change(1, ChangeType::Put, Some(serde_json::json!(true))),
            ])
            .is_ok());
        assert!(checker
            .check(&[change(2, ChangeType::Put, Some(serde_json::json!(1)))])
            .is_err());
    }

    #[test]
    fn id_ledger_detects_reuse() {
        let mut tree = StateTree::new();
        let a = tree.create_element("a");
        let b = tree.create_element("b");
        let mut ledger = IdLedger::new();
        assert!(ledger.observe(&[(a, NodeId(1))]).is_ok());
        assert!(ledger.observe(&[(a, NodeId(1))]).is_ok());
        assert!(ledger.observe(&[(b, NodeId(1))]).is_err());
    }

    #[test]
    fn test_session_delivers() {
        with_session(|session| {
            session.with_tree(|tree| {
                let root = tree.create_element("body");
                tree.attach_root(root).unwrap();
            });
            session.sync().unwrap();
            assert_eq!(session.rendered()["document"]["root"]["@id"], serde_json::json!(1));
        });
    }
}
