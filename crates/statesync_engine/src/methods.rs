//! Template methods callable from the client.
//!
//! Methods are registered per element tag when the application starts and
//! never change afterwards. A call names the method and passes its
//! arguments; the call resolves only when exactly one registration for the
//! target's tag matches the name and argument count.

use crate::error::{EngineError, EngineResult};
use statesync_codec::Value;
use statesync_core::{CoreResult, NodeKey, StateTree};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// An argument of a template method call.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodArg {
    /// A plain value.
    Value(Value),
    /// A node of the same tree.
    Node(NodeKey),
}

/// A template method. It receives the node it was called on.
pub type Method =
    Arc<dyn Fn(&mut StateTree, NodeKey, &[MethodArg]) -> CoreResult<()> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    name: String,
    arity: Option<usize>,
    method: Method,
}

impl Registration {
    fn matches(&self, name: &str, arity: usize) -> bool {
        self.name == name && self.arity.map_or(true, |a| a == arity)
    }
}

/// Methods per element tag.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    by_tag: HashMap<String, Vec<Registration>>,
}

impl MethodRegistry {
    /// Starts building a registry.
    pub fn builder() -> MethodRegistryBuilder {
        MethodRegistryBuilder::default()
    }

    /// A registry without methods.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether no method is registered.
    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    /// Finds the single method `name` of `tag` accepting `arity` arguments.
    pub fn resolve(&self, tag: &str, name: &str, arity: usize) -> EngineResult<Method> {
        let mut matches = self
            .by_tag
            .get(tag)
            .into_iter()
            .flatten()
            .filter(|reg| reg.matches(name, arity));
        match (matches.next(), matches.next()) {
            (Some(reg), None) => Ok(reg.method.clone()),
            (first, second) => Err(EngineError::AmbiguousOrMissingHandler {
                tag: tag.to_string(),
                method: name.to_string(),
                matches: usize::from(first.is_some())
                    + usize::from(second.is_some())
                    + matches.count(),
            }),
        }
    }

    /// Distinct method names of `tag`, in registration order.
    pub fn method_names(&self, tag: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for reg in self.by_tag.get(tag).into_iter().flatten() {
            if !names.contains(&reg.name) {
                names.push(reg.name.clone());
            }
        }
        names
    }

    /// Tells the client which methods `node` answers to.
    ///
    /// The names land in the node's client handler list.
    pub fn publish_handlers(&self, tree: &mut StateTree, node: NodeKey) -> CoreResult<()> {
        let names = tree
            .tag(node)
            .map(|tag| self.method_names(tag))
            .unwrap_or_default();
        tree.set_client_handlers(node, &names)
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.by_tag.iter().map(|(tag, regs)| {
                (tag, regs.iter().map(|r| r.name.as_str()).collect::<Vec<_>>())
            }))
            .finish()
    }
}

/// Builder for [`MethodRegistry`].
#[derive(Default)]
pub struct MethodRegistryBuilder {
    by_tag: HashMap<String, Vec<Registration>>,
}

impl MethodRegistryBuilder {
    /// Registers `name` on `tag` for any argument count.
    pub fn method<F>(self, tag: &str, name: &str, method: F) -> Self
    where
        F: Fn(&mut StateTree, NodeKey, &[MethodArg]) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.register(tag, name, None, Arc::new(method))
    }

    /// Registers `name` on `tag` for exactly `arity` arguments.
    pub fn method_with_arity<F>(self, tag: &str, name: &str, arity: usize, method: F) -> Self
    where
        F: Fn(&mut StateTree, NodeKey, &[MethodArg]) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.register(tag, name, Some(arity), Arc::new(method))
    }

    fn register(mut self, tag: &str, name: &str, arity: Option<usize>, method: Method) -> Self {
        self.by_tag.entry(tag.to_string()).or_default().push(Registration {
            name: name.to_string(),
            arity,
            method,
        });
        self
    }

    /// Finishes the registry.
    pub fn build(self) -> MethodRegistry {
        MethodRegistry { by_tag: self.by_tag }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut StateTree, _: NodeKey, _: &[MethodArg]) -> CoreResult<()> {
        Ok(())
    }

    #[test]
    fn resolves_single_match() {
        let registry = MethodRegistry::builder()
            .method("my-list", "select", noop)
            .method("my-list", "clear", noop)
            .build();
        assert!(registry.resolve("my-list", "select", 1).is_ok());
        assert_eq!(registry.method_names("my-list"), vec!["select", "clear"]);
    }

    #[test]
    fn missing_and_ambiguous_methods() {
        let registry = MethodRegistry::builder()
            .method("my-list", "select", noop)
            .method("my-list", "select", noop)
            .method_with_arity("my-list", "move", 2, noop)
            .build();

        let err = registry.resolve("my-list", "select", 0).err().unwrap();
        assert!(matches!(err, EngineError::AmbiguousOrMissingHandler { matches: 2, .. }));

        let err = registry.resolve("my-list", "move", 1).err().unwrap();
        assert!(matches!(err, EngineError::AmbiguousOrMissingHandler { matches: 0, .. }));
        assert!(registry.resolve("my-list", "move", 2).is_ok());

        let err = registry.resolve("other", "select", 0).err().unwrap();
        assert!(matches!(err, EngineError::AmbiguousOrMissingHandler { matches: 0, .. }));
        assert_eq!(registry.method_names("my-list"), vec!["select", "move"]);
    }

    #[test]
    fn publish_writes_client_handlers() {
        let registry = MethodRegistry::builder()
            .method("my-list", "select", noop)
            .method("my-list", "clear", noop)
            .build();
        let mut tree = StateTree::new();
        let node = tree.create_element("my-list");
        tree.attach_root(node).unwrap();

        registry.publish_handlers(&mut tree, node).unwrap();
        assert_eq!(tree.client_handlers(node).unwrap(), vec!["select", "clear"]);
    }
}
