//! An arena-backed element tree with child-list mutation records.
//!
//! Stands in for the host page's document: elements carry a tag and
//! attributes, attach and detach under a fixed root, and every child-list
//! change is recorded so an observer can re-scan the mutated subtrees.

use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use thiserror::Error;

/// Handle to one element in an [`ElementTree`].
///
/// Ids are minted by the tree and stay valid for its lifetime; a detached
/// element keeps its id and can be re-attached later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    /// Appending would make a node its own ancestor.
    #[error("appending {child} under {parent} would create a cycle")]
    WouldCycle { parent: NodeId, child: NodeId },
    #[error("the root cannot be reparented")]
    ReparentRoot,
    #[error("{child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },
}

/// One child-list change. `target` is the parent whose children changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// An element: tag plus attributes. `id` and `class` are ordinary
/// attributes with convenience accessors, as in the DOM.
#[derive(Debug, Clone)]
pub struct Element {
    tag: String,
    attributes: BTreeMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Element {
    fn new(tag: String) -> Self {
        Self {
            tag,
            attributes: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }

    /// The raw `class` attribute, empty when unset.
    #[must_use]
    pub fn class_name(&self) -> &str {
        self.attribute("class").unwrap_or("")
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.class_name().split_whitespace()
    }

    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// The tree itself. Created with a single `#document` root; everything else
/// starts detached and is attached with [`Self::append_child`].
#[derive(Debug)]
pub struct ElementTree {
    nodes: Vec<Element>,
    root: NodeId,
    mutations: Vec<MutationRecord>,
}

impl Default for ElementTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementTree {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Element::new("#document".to_owned())],
            root: NodeId(0),
            mutations: Vec::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Element::new(tag.into()));
        id
    }

    #[must_use]
    pub fn element(&self, node: NodeId) -> &Element {
        &self.nodes[node.0]
    }

    pub fn set_attribute(
        &mut self,
        node: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.nodes[node.0].attributes.insert(name.into(), value.into());
    }

    /// Append `class` to the node's class list unless already present.
    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if self.nodes[node.0].has_class(class) {
            return;
        }
        let current = self.nodes[node.0]
            .attributes
            .entry("class".to_owned())
            .or_default();
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(class);
    }

    /// Move `child` to the end of `parent`'s child list, detaching it from
    /// any previous parent first. Both the detach and the attach are
    /// recorded.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        if child == self.root {
            return Err(TreeError::ReparentRoot);
        }
        if child == parent || self.is_ancestor(child, parent) {
            return Err(TreeError::WouldCycle { parent, child });
        }

        if let Some(old_parent) = self.nodes[child.0].parent {
            self.detach(old_parent, child);
            self.mutations.push(MutationRecord {
                target: old_parent,
                added: Vec::new(),
                removed: vec![child],
            });
        }

        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        self.mutations.push(MutationRecord {
            target: parent,
            added: vec![child],
            removed: Vec::new(),
        });
        Ok(())
    }

    /// Detach `child` from `parent`. Its subtree stays intact but is no
    /// longer reachable from the root.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        if self.nodes[child.0].parent != Some(parent) {
            return Err(TreeError::NotAChild { parent, child });
        }
        self.detach(parent, child);
        self.mutations.push(MutationRecord {
            target: parent,
            added: Vec::new(),
            removed: vec![child],
        });
        Ok(())
    }

    /// Whether `node` is reachable from the root.
    #[must_use]
    pub fn is_attached(&self, node: NodeId) -> bool {
        node == self.root || self.is_ancestor(self.root, node)
    }

    /// DOM-style inclusive containment: `node` is `ancestor` itself or
    /// somewhere in its subtree.
    #[must_use]
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.is_ancestor(ancestor, node)
    }

    /// Strict descendants of `node` in document order.
    pub fn descendants(&self, node: NodeId) -> Descendants<'_> {
        let mut stack = self.nodes[node.0].children.clone();
        stack.reverse();
        Descendants { tree: self, stack }
    }

    /// Drain the mutation records accumulated since the last call.
    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        mem::take(&mut self.mutations)
    }

    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.nodes[node.0].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes[parent.0].parent;
        }
        false
    }

    fn detach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.retain(|&c| c != child);
        self.nodes[child.0].parent = None;
    }
}

/// Pre-order iterator returned by [`ElementTree::descendants`].
pub struct Descendants<'a> {
    tree: &'a ElementTree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let node = self.stack.pop()?;
        self.stack
            .extend(self.tree.nodes[node.0].children.iter().rev().copied());
        Some(node)
    }
}
