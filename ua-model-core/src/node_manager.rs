use crate::node::{Node, ReferenceKind};
use opcua::types::NodeId;
use std::collections::HashSet;
use ua_model_error::{ModelError, ModelResult};

/// Sink every construction step registers its nodes with.
///
/// Construction treats a failed add as a corrupted information model and
/// escalates it immediately; implementations only report what went wrong.
pub trait NodeManagerConfig: Send {
    /// Namespace new instance nodes are created in.
    fn namespace_index(&self) -> u16;

    /// Register `node` and link it under `parent` with a hierarchical reference.
    fn add_node_and_reference(
        &mut self,
        parent: &NodeId,
        node: Node,
        reference: ReferenceKind,
    ) -> ModelResult<()>;

    /// Add a reference between two already registered nodes.
    fn add_reference(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        reference: ReferenceKind,
    ) -> ModelResult<()>;
}

#[derive(Debug, Clone)]
pub(crate) struct StagedLink {
    pub(crate) source: NodeId,
    pub(crate) target: NodeId,
    pub(crate) reference_type: ReferenceKind,
}

/// Nodes and references collected during one construction, inserted into the
/// graph in a single step by `NodeGraph::apply`.
///
/// Parents that are not staged are looked up in the graph when the tree is
/// applied, so a subtree can hang off an existing folder or type node.
#[derive(Debug)]
pub struct StagedTree {
    namespace_index: u16,
    nodes: Vec<Node>,
    links: Vec<StagedLink>,
    ids: HashSet<NodeId>,
    parented: HashSet<NodeId>,
}

impl StagedTree {
    pub fn new(namespace_index: u16) -> Self {
        Self {
            namespace_index,
            nodes: Vec::new(),
            links: Vec::new(),
            ids: HashSet::new(),
            parented: HashSet::new(),
        }
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
        self.ids.contains(node_id)
    }

    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.node_id == node_id)
    }

    /// Staged forward hierarchical children of `parent`, in insertion order.
    pub fn children(&self, parent: &NodeId) -> Vec<(ReferenceKind, NodeId)> {
        self.links
            .iter()
            .filter(|l| &l.source == parent && l.reference_type.is_hierarchical())
            .map(|l| (l.reference_type, l.target.clone()))
            .collect()
    }

    pub(crate) fn into_parts(self) -> (Vec<Node>, Vec<StagedLink>) {
        (self.nodes, self.links)
    }
}

impl NodeManagerConfig for StagedTree {
    fn namespace_index(&self) -> u16 {
        self.namespace_index
    }

    fn add_node_and_reference(
        &mut self,
        parent: &NodeId,
        node: Node,
        reference: ReferenceKind,
    ) -> ModelResult<()> {
        if !reference.is_hierarchical() {
            return Err(ModelError::InvalidReference(format!(
                "{reference:?} cannot link a child node"
            )));
        }
        if self.ids.contains(&node.node_id) {
            return Err(ModelError::NodeIdExists(node.node_id.to_string()));
        }
        let node_id = node.node_id.clone();
        self.ids.insert(node_id.clone());
        self.parented.insert(node_id.clone());
        self.nodes.push(node);
        self.links.push(StagedLink {
            source: parent.clone(),
            target: node_id,
            reference_type: reference,
        });
        Ok(())
    }

    fn add_reference(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        reference: ReferenceKind,
    ) -> ModelResult<()> {
        if reference.is_hierarchical() && !self.parented.insert(target.clone()) {
            return Err(ModelError::InvalidReference(format!(
                "{target} already has a parent"
            )));
        }
        self.links.push(StagedLink {
            source: source.clone(),
            target: target.clone(),
            reference_type: reference,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcua::types::QualifiedName;

    fn folder(id: &str) -> Node {
        Node::folder(NodeId::new(2, id.to_string()), QualifiedName::new(2, id))
    }

    #[test]
    fn test_duplicate_staged_id_fails_fast() {
        let mut staged = StagedTree::new(2);
        let parent = NodeId::new(0, 85u32);
        staged
            .add_node_and_reference(&parent, folder("A"), ReferenceKind::Organizes)
            .unwrap();
        let err = staged
            .add_node_and_reference(&parent, folder("A"), ReferenceKind::Organizes)
            .unwrap_err();
        assert!(matches!(err, ModelError::NodeIdExists(_)));
        assert_eq!(staged.len(), 1);
    }

    #[test]
    fn test_children_keep_insertion_order() {
        let mut staged = StagedTree::new(2);
        let root = NodeId::new(2, "Root");
        for name in ["C", "A", "B"] {
            staged
                .add_node_and_reference(&root, folder(name), ReferenceKind::HasComponent)
                .unwrap();
        }
        let names: Vec<NodeId> = staged.children(&root).into_iter().map(|(_, id)| id).collect();
        assert_eq!(
            names,
            vec![NodeId::new(2, "C"), NodeId::new(2, "A"), NodeId::new(2, "B")]
        );
    }

    #[test]
    fn test_non_hierarchical_child_link_rejected() {
        let mut staged = StagedTree::new(2);
        let err = staged
            .add_node_and_reference(
                &NodeId::new(2, "Root"),
                folder("A"),
                ReferenceKind::HasTypeDefinition,
            )
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidReference(_)));
    }
}
