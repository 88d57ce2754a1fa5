use super::{FeatureKind, NodeFeature};
use crate::change::Change;
use crate::event::{Listener, ListenerId};
use crate::types::{NodeId, NodeKey};
use indexmap::IndexMap;
use statesync_codec::Value;
use std::fmt;

#[derive(Clone)]
struct Registration {
    id: ListenerId,
    listener: Listener,
    data: Vec<String>,
}

/// Event listeners keyed by event type.
///
/// Only the event types and their data expressions reach the client. The
/// wire value of a type is the ordered union of the expressions of all its
/// listeners.
#[derive(Clone, Default)]
pub struct ListenerMap {
    types: IndexMap<String, Vec<Registration>>,
}

impl ListenerMap {
    /// Event types with at least one listener, in registration order.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Whether `event_type` has a listener.
    pub fn has_listener(&self, event_type: &str) -> bool {
        self.types.contains_key(event_type)
    }

    /// The event type a listener is registered for.
    pub fn event_type_of(&self, id: ListenerId) -> Option<&str> {
        self.types
            .iter()
            .find(|(_, regs)| regs.iter().any(|r| r.id == id))
            .map(|(event_type, _)| event_type.as_str())
    }

    /// Snapshot of the listeners for `event_type`.
    pub fn listeners(&self, event_type: &str) -> Vec<Listener> {
        self.types
            .get(event_type)
            .map(|regs| regs.iter().map(|r| r.listener.clone()).collect())
            .unwrap_or_default()
    }

    /// Wire value of `event_type`, or `None` when it has no listener.
    pub fn wire_value(&self, event_type: &str) -> Option<Value> {
        let regs = self.types.get(event_type)?;
        let mut expressions: Vec<&str> = Vec::new();
        for expression in regs.iter().flat_map(|r| r.data.iter()) {
            if !expressions.contains(&expression.as_str()) {
                expressions.push(expression);
            }
        }
        Some(Value::from(expressions))
    }

    pub(crate) fn add(&mut self, event_type: &str, id: ListenerId, listener: Listener) {
        self.types
            .entry(event_type.to_string())
            .or_default()
            .push(Registration {
                id,
                listener,
                data: Vec::new(),
            });
    }

    pub(crate) fn add_data(&mut self, id: ListenerId, expression: &str) {
        if let Some(reg) = self
            .types
            .values_mut()
            .flat_map(|regs| regs.iter_mut())
            .find(|r| r.id == id)
        {
            reg.data.push(expression.to_string());
        }
    }

    pub(crate) fn remove(&mut self, id: ListenerId) {
        let mut emptied = None;
        for (event_type, regs) in self.types.iter_mut() {
            if let Some(pos) = regs.iter().position(|r| r.id == id) {
                regs.remove(pos);
                if regs.is_empty() {
                    emptied = Some(event_type.clone());
                }
                break;
            }
        }
        if let Some(event_type) = emptied {
            self.types.shift_remove(&event_type);
        }
    }
}

impl fmt::Debug for ListenerMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.types
                    .iter()
                    .map(|(k, regs)| (k, regs.iter().map(|r| r.id).collect::<Vec<_>>())),
            )
            .finish()
    }
}

impl NodeFeature for ListenerMap {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Listeners
    }

    fn collect_from_empty(
        &self,
        _resolve: &dyn Fn(NodeKey) -> Option<NodeId>,
        out: &mut Vec<Change>,
    ) {
        for event_type in self.types.keys() {
            if let Some(value) = self.wire_value(event_type) {
                out.push(Change::Put {
                    key: event_type.clone(),
                    value,
                });
            }
        }
    }

    fn for_each_child(&self, _visit: &mut dyn FnMut(NodeKey)) {}
}
