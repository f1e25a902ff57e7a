//! In-memory address space graph.
//!
//! Every node is keyed by its `NodeId`. References are stored on both ends
//! (forward on the source, inverse on the target) so parent lookups and
//! browse operations are O(references of that node).
//!
//! Invariants enforced here:
//! - a NodeId is inserted at most once
//! - both ends of a reference exist when it is added
//! - a node has at most one hierarchical parent
//! - removing a node removes its hierarchical descendants and every reference
//!   touching any removed node

use crate::{
    node::{CachedValue, Node, NodeClass, ReferenceKind},
    node_manager::StagedTree,
};
use chrono::Utc;
use opcua::{
    sync::RwLock,
    types::{NodeId, QualifiedName, StatusCode, Variant},
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use ua_model_error::{ModelError, ModelResult};

pub type SharedGraph = Arc<RwLock<NodeGraph>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub reference_type: ReferenceKind,
    /// The node at the other end of the edge.
    pub target: NodeId,
    pub is_forward: bool,
}

#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: HashMap<NodeId, Node>,
    references: HashMap<NodeId, Vec<Reference>>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedGraph {
        Arc::new(RwLock::new(self))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    #[inline]
    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    #[inline]
    pub fn node_mut(&mut self, node_id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(node_id)
    }

    pub fn count_in_namespace(&self, namespace: u16) -> usize {
        self.nodes.keys().filter(|id| id.namespace == namespace).count()
    }

    /// Insert a node without linking it to a parent.
    ///
    /// HasTypeDefinition and HasModellingRule references are added for the
    /// node's attributes when their targets are already present.
    pub fn insert_node(&mut self, node: Node) -> ModelResult<()> {
        if self.nodes.contains_key(&node.node_id) {
            return Err(ModelError::NodeIdExists(node.node_id.to_string()));
        }
        let node_id = node.node_id.clone();
        let type_definition = node.type_definition.clone();
        let modelling_rule = node.modelling_rule.map(|rule| rule.node_id());
        self.nodes.insert(node_id.clone(), node);
        self.references.entry(node_id.clone()).or_default();

        if let Some(type_definition) = type_definition.filter(|t| self.contains(t)) {
            self.link(&node_id, &type_definition, ReferenceKind::HasTypeDefinition);
        }
        if let Some(rule) = modelling_rule.filter(|r| self.contains(r)) {
            self.link(&node_id, &rule, ReferenceKind::HasModellingRule);
        }
        Ok(())
    }

    pub fn add_reference(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        reference_type: ReferenceKind,
    ) -> ModelResult<()> {
        self.check_reference(source, target, reference_type)?;
        self.link(source, target, reference_type);
        Ok(())
    }

    /// Insert `node` and link it under `parent` in one step. The graph is left
    /// untouched when either part fails.
    pub fn add_node_and_reference(
        &mut self,
        parent: &NodeId,
        node: Node,
        reference_type: ReferenceKind,
    ) -> ModelResult<()> {
        if !reference_type.is_hierarchical() {
            return Err(ModelError::InvalidReference(format!(
                "{reference_type:?} cannot link a child node"
            )));
        }
        if !self.contains(parent) {
            return Err(ModelError::NodeNotFound(parent.to_string()));
        }
        let node_id = node.node_id.clone();
        self.insert_node(node)?;
        self.link(parent, &node_id, reference_type);
        Ok(())
    }

    fn check_reference(
        &self,
        source: &NodeId,
        target: &NodeId,
        reference_type: ReferenceKind,
    ) -> ModelResult<()> {
        if !self.contains(source) {
            return Err(ModelError::NodeNotFound(source.to_string()));
        }
        if !self.contains(target) {
            return Err(ModelError::NodeNotFound(target.to_string()));
        }
        if reference_type.is_hierarchical() {
            if let Some((_, existing)) = self.parent(target) {
                return Err(ModelError::InvalidReference(format!(
                    "{target} already has parent {existing}"
                )));
            }
        }
        let duplicate = self.references(source).iter().any(|r| {
            r.is_forward && r.reference_type == reference_type && &r.target == target
        });
        if duplicate {
            return Err(ModelError::InvalidReference(format!(
                "{reference_type:?} {source} -> {target} already exists"
            )));
        }
        Ok(())
    }

    fn link(&mut self, source: &NodeId, target: &NodeId, reference_type: ReferenceKind) {
        self.references
            .entry(source.clone())
            .or_default()
            .push(Reference {
                reference_type,
                target: target.clone(),
                is_forward: true,
            });
        self.references
            .entry(target.clone())
            .or_default()
            .push(Reference {
                reference_type,
                target: source.clone(),
                is_forward: false,
            });
    }

    /// Insert a staged subtree atomically.
    ///
    /// Everything is validated before the first insert, so on error the graph
    /// is unchanged. Returns the inserted ids in staging order.
    pub fn apply(&mut self, staged: StagedTree) -> ModelResult<Vec<NodeId>> {
        let (nodes, links) = staged.into_parts();
        let staged_ids: HashSet<&NodeId> = nodes.iter().map(|n| &n.node_id).collect();

        for node in &nodes {
            if self.contains(&node.node_id) {
                return Err(ModelError::NodeIdExists(node.node_id.to_string()));
            }
        }
        for link in &links {
            for end in [&link.source, &link.target] {
                if !self.contains(end) && !staged_ids.contains(end) {
                    return Err(ModelError::NodeNotFound(end.to_string()));
                }
            }
            if link.reference_type.is_hierarchical()
                && !staged_ids.contains(&link.target)
                && self.parent(&link.target).is_some()
            {
                return Err(ModelError::InvalidReference(format!(
                    "{} already has a parent",
                    link.target
                )));
            }
        }

        let inserted: Vec<NodeId> = nodes.iter().map(|n| n.node_id.clone()).collect();
        let mut nodes: HashMap<NodeId, Node> =
            nodes.into_iter().map(|n| (n.node_id.clone(), n)).collect();
        // Staging order is parent-first, so targets exist by the time they are linked.
        for link in links {
            if let Some(node) = nodes.remove(&link.target) {
                self.add_node_and_reference(&link.source, node, link.reference_type)?;
            } else {
                self.add_reference(&link.source, &link.target, link.reference_type)?;
            }
        }
        for (_, node) in nodes {
            self.insert_node(node)?;
        }
        Ok(inserted)
    }

    #[inline]
    pub fn references(&self, node_id: &NodeId) -> &[Reference] {
        self.references
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Forward hierarchical children in insertion order.
    pub fn children(&self, node_id: &NodeId) -> Vec<(ReferenceKind, NodeId)> {
        self.references(node_id)
            .iter()
            .filter(|r| r.is_forward && r.reference_type.is_hierarchical())
            .map(|r| (r.reference_type, r.target.clone()))
            .collect()
    }

    pub fn parent(&self, node_id: &NodeId) -> Option<(ReferenceKind, NodeId)> {
        self.references(node_id)
            .iter()
            .find(|r| !r.is_forward && r.reference_type.is_hierarchical())
            .map(|r| (r.reference_type, r.target.clone()))
    }

    pub fn type_definition(&self, node_id: &NodeId) -> Option<NodeId> {
        self.node(node_id).and_then(|n| n.type_definition.clone())
    }

    /// Find a direct child by exact browse name.
    pub fn find_child(&self, parent: &NodeId, browse_name: &QualifiedName) -> Option<NodeId> {
        self.children(parent).into_iter().find_map(|(_, child)| {
            self.node(&child)
                .filter(|n| n.browse_name == *browse_name)
                .map(|_| child.clone())
        })
    }

    /// Resolve a relative path of browse-name strings, ignoring namespaces.
    pub fn browse_path(&self, start: &NodeId, path: &[&str]) -> Option<NodeId> {
        let mut current = start.clone();
        for segment in path {
            current = self.children(&current).into_iter().find_map(|(_, child)| {
                self.node(&child)
                    .filter(|n| n.browse_name.name.as_ref() == *segment)
                    .map(|_| child.clone())
            })?;
        }
        Some(current)
    }

    /// `root` and all of its hierarchical descendants, pre-order.
    pub fn descendants(&self, root: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root.clone()];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if !self.contains(&id) || !seen.insert(id.clone()) {
                continue;
            }
            let children = self.children(&id);
            out.push(id);
            stack.extend(children.into_iter().rev().map(|(_, child)| child));
        }
        out
    }

    /// Remove `root` and its hierarchical descendants. Returns the removed count.
    pub fn remove_subtree(&mut self, root: &NodeId) -> usize {
        let doomed = self.descendants(root);
        self.remove_all(&doomed)
    }

    /// Remove every node of a namespace, cascading into hierarchical children.
    pub fn remove_namespace(&mut self, namespace: u16) -> usize {
        let roots: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| id.namespace == namespace)
            .cloned()
            .collect();
        let mut doomed = HashSet::new();
        for root in &roots {
            doomed.extend(self.descendants(root));
        }
        let doomed: Vec<NodeId> = doomed.into_iter().collect();
        self.remove_all(&doomed)
    }

    fn remove_all(&mut self, doomed: &[NodeId]) -> usize {
        let doomed_set: HashSet<&NodeId> = doomed.iter().collect();
        let mut removed = 0;
        for id in doomed {
            if self.nodes.remove(id).is_some() {
                removed += 1;
            }
            if let Some(refs) = self.references.remove(id) {
                for r in refs.iter().filter(|r| !doomed_set.contains(&r.target)) {
                    if let Some(other) = self.references.get_mut(&r.target) {
                        other.retain(|o| &o.target != id);
                    }
                }
            }
        }
        removed
    }

    pub fn value(&self, node_id: &NodeId) -> ModelResult<&CachedValue> {
        let node = self
            .node(node_id)
            .ok_or_else(|| ModelError::NodeNotFound(node_id.to_string()))?;
        node.as_variable()
            .map(|v| &v.value)
            .ok_or_else(|| ModelError::TypeMismatch(format!("{node_id} is not a variable")))
    }

    /// Replace a variable's cached value. Access levels are checked by the caller.
    pub fn set_value(&mut self, node_id: &NodeId, value: Variant) -> ModelResult<()> {
        let node = self
            .node_mut(node_id)
            .ok_or_else(|| ModelError::NodeNotFound(node_id.to_string()))?;
        let body = node
            .as_variable_mut()
            .ok_or_else(|| ModelError::TypeMismatch(format!("{node_id} is not a variable")))?;
        body.value = CachedValue {
            value,
            status: StatusCode::Good,
            source_timestamp: Utc::now(),
        };
        Ok(())
    }

    pub fn node_class(&self, node_id: &NodeId) -> Option<NodeClass> {
        self.node(node_id).map(Node::node_class)
    }
}
