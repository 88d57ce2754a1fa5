//! DOM event listeners.

use crate::change::Change;
use crate::error::{CoreError, CoreResult};
use crate::feature::{Feature, FeatureKind, ListenerMap};
use crate::tree::StateTree;
use crate::types::NodeKey;
use statesync_codec::Value;
use std::fmt;
use std::sync::Arc;

/// Identifier of a registered listener, unique within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener:{}", self.0)
    }
}

/// A listener callback. It runs with exclusive access to the tree.
pub type Listener = Arc<dyn Fn(&mut StateTree, &DomEvent) -> CoreResult<()> + Send + Sync>;

/// An event fired by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct DomEvent {
    /// The node the event fired on.
    pub node: NodeKey,
    /// Event type, such as `click`.
    pub event_type: String,
    /// Values of the requested data expressions.
    pub data: Value,
}

/// Result of firing an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// No listener is registered for the type.
    NoListener,
    /// This many listeners ran.
    Delivered(usize),
}

impl StateTree {
    /// Registers a listener for `event_type` on `node`.
    pub fn add_event_listener(
        &mut self,
        node: NodeKey,
        event_type: &str,
        listener: Listener,
    ) -> CoreResult<ListenerId> {
        let id = self.next_listener_id();
        self.update_listeners(node, event_type, |map| map.add(event_type, id, listener))?;
        Ok(id)
    }

    /// Asks the client to send `expression` along with events that reach the
    /// given listener.
    pub fn add_event_data(
        &mut self,
        node: NodeKey,
        listener: ListenerId,
        expression: &str,
    ) -> CoreResult<bool> {
        let event_type = match self
            .listener_map(node)?
            .and_then(|map| map.event_type_of(listener))
        {
            Some(event_type) => event_type.to_string(),
            None => return Ok(false),
        };
        self.update_listeners(node, &event_type, |map| map.add_data(listener, expression))?;
        Ok(true)
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn remove_event_listener(
        &mut self,
        node: NodeKey,
        listener: ListenerId,
    ) -> CoreResult<bool> {
        let event_type = match self
            .listener_map(node)?
            .and_then(|map| map.event_type_of(listener))
        {
            Some(event_type) => event_type.to_string(),
            None => return Ok(false),
        };
        self.update_listeners(node, &event_type, |map| {
            map.remove(listener);
        })?;
        Ok(true)
    }

    /// Event types with at least one listener.
    pub fn event_types(&self, node: NodeKey) -> CoreResult<Vec<String>> {
        Ok(self
            .listener_map(node)?
            .map(|map| map.event_types().map(str::to_string).collect())
            .unwrap_or_default())
    }

    /// Runs every listener registered for `event_type` on `node`, in
    /// registration order.
    ///
    /// Listeners are cloned out of the feature before running, so a listener
    /// may freely add or remove listeners, or detach the node it fired on.
    pub fn fire_event(
        &mut self,
        node: NodeKey,
        event_type: &str,
        data: Value,
    ) -> CoreResult<FireOutcome> {
        let listeners = self
            .listener_map(node)?
            .map(|map| map.listeners(event_type))
            .unwrap_or_default();
        if listeners.is_empty() {
            return Ok(FireOutcome::NoListener);
        }
        let event = DomEvent {
            node,
            event_type: event_type.to_string(),
            data,
        };
        for listener in &listeners {
            listener(self, &event)?;
        }
        Ok(FireOutcome::Delivered(listeners.len()))
    }

    fn listener_map(&self, node: NodeKey) -> CoreResult<Option<&ListenerMap>> {
        match self.feature(node, FeatureKind::Listeners)? {
            Some(Feature::Listeners(map)) => Ok(Some(map)),
            _ => Ok(None),
        }
    }

    /// Applies `update` to the listener map and records the new wire value of
    /// `event_type`.
    fn update_listeners<R>(
        &mut self,
        node: NodeKey,
        event_type: &str,
        update: impl FnOnce(&mut ListenerMap) -> R,
    ) -> CoreResult<R> {
        let map = match self.feature_mut(node, FeatureKind::Listeners)? {
            Feature::Listeners(map) => map,
            _ => {
                return Err(CoreError::MissingFeature {
                    node,
                    kind: FeatureKind::Listeners,
                })
            }
        };
        let before = map.wire_value(event_type);
        let result = update(map);
        let after = map.wire_value(event_type);
        let wire = (before != after).then_some(after);
        if let Some(after) = wire {
            let change = match after {
                Some(value) => Change::Put {
                    key: event_type.to_string(),
                    value,
                },
                None => Change::Remove {
                    key: event_type.to_string(),
                },
            };
            self.record(node, FeatureKind::Listeners, change);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::build;

    fn setup() -> (StateTree, NodeKey) {
        let mut tree = StateTree::new();
        let root = tree.create_element("body");
        tree.attach_root(root).unwrap();
        build(&mut tree);
        (tree, root)
    }

    fn noop() -> Listener {
        Arc::new(|_: &mut StateTree, _: &DomEvent| Ok(()))
    }

    fn last_change(tree: &StateTree, node: NodeKey) -> Option<Change> {
        tree.node(node)?.queued().last().map(|r| r.change.clone())
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let (mut tree, root) = setup();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            let log = log.clone();
            tree.add_event_listener(
                root,
                "click",
                Arc::new(move |_: &mut StateTree, event: &DomEvent| {
                    log.lock().unwrap().push(format!("{name}:{}", event.event_type));
                    Ok(())
                }),
            )
            .unwrap();
        }

        let data = Value::map([("x", Value::Integer(1))]);
        let outcome = tree.fire_event(root, "click", data).unwrap();
        assert_eq!(outcome, FireOutcome::Delivered(2));
        assert_eq!(*log.lock().unwrap(), vec!["first:click", "second:click"]);
        assert_eq!(tree.fire_event(root, "keydown", Value::Null).unwrap(), FireOutcome::NoListener);
    }

    #[test]
    fn listener_may_mutate_the_tree() {
        let (mut tree, root) = setup();
        tree.add_event_listener(
            root,
            "click",
            Arc::new(|tree: &mut StateTree, event: &DomEvent| {
                tree.set_property(event.node, "clicked", true)
            }),
        )
        .unwrap();

        tree.fire_event(root, "click", Value::Null).unwrap();
        assert_eq!(
            last_change(&tree, root),
            Some(Change::Put {
                key: "clicked".into(),
                value: Value::Bool(true)
            })
        );
    }

    #[test]
    fn listener_errors_propagate() {
        let (mut tree, root) = setup();
        let failing: Listener =
            Arc::new(|_: &mut StateTree, _: &DomEvent| Err(CoreError::handler("boom")));
        tree.add_event_listener(root, "click", failing).unwrap();
        assert!(matches!(
            tree.fire_event(root, "click", Value::Null),
            Err(CoreError::HandlerFailed { .. })
        ));
    }

    #[test]
    fn wire_changes_follow_listener_lifecycle() {
        let (mut tree, root) = setup();
        let first = tree.add_event_listener(root, "click", noop()).unwrap();
        assert_eq!(
            last_change(&tree, root),
            Some(Change::Put {
                key: "click".into(),
                value: Value::Array(vec![])
            })
        );

        assert!(tree.add_event_data(root, first, "event.button").unwrap());
        assert_eq!(
            last_change(&tree, root),
            Some(Change::Put {
                key: "click".into(),
                value: Value::from(vec!["event.button"])
            })
        );

        // A second listener without data leaves the wire value unchanged.
        let queued = tree.node(root).unwrap().queued().len();
        let second = tree.add_event_listener(root, "click", noop()).unwrap();
        assert_eq!(tree.node(root).unwrap().queued().len(), queued);

        assert!(tree.remove_event_listener(root, first).unwrap());
        assert!(tree.remove_event_listener(root, second).unwrap());
        assert_eq!(
            last_change(&tree, root),
            Some(Change::Remove {
                key: "click".into()
            })
        );
        assert!(!tree.remove_event_listener(root, second).unwrap());
        assert!(tree.event_types(root).unwrap().is_empty());
    }
}
