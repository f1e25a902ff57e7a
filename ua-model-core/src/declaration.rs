//! Declaration trees: externally described nodes an instance is built from.
//!
//! A provider (a NodeSet loader, a type layout, a test) describes nodes as a
//! `DeclarationTree` or pushes them straight into a `DeclarationArena`. The
//! arena is scoped to one construction and dropped wholesale afterwards.

use crate::node::{MethodArgument, ModellingRule, NodeClass, ReferenceKind, ACCESS_CURRENT_READ};
use opcua::types::{LocalizedText, NodeId, QualifiedName, Variant};
use std::{ops::Index, sync::Arc};

/// A declared node. Only the attributes relevant to its class are read.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub node_id: NodeId,
    pub browse_name: QualifiedName,
    pub display_name: Option<LocalizedText>,
    pub description: Option<LocalizedText>,
    pub node_class: NodeClass,
    pub type_definition: Option<NodeId>,
    /// Modelling rule object as declared. A null id means "none declared".
    pub modelling_rule: NodeId,
    pub data_type: Option<NodeId>,
    pub value_rank: i32,
    pub access_level: u8,
    pub value: Variant,
    pub arguments: Option<Arc<[MethodArgument]>>,
}

impl Declaration {
    fn new(node_id: NodeId, browse_name: QualifiedName, node_class: NodeClass) -> Self {
        Self {
            node_id,
            browse_name,
            display_name: None,
            description: None,
            node_class,
            type_definition: None,
            modelling_rule: NodeId::null(),
            data_type: None,
            value_rank: -1,
            access_level: ACCESS_CURRENT_READ,
            value: Variant::Empty,
            arguments: None,
        }
    }

    pub fn object(node_id: NodeId, browse_name: QualifiedName, type_definition: NodeId) -> Self {
        let mut decl = Self::new(node_id, browse_name, NodeClass::Object);
        decl.type_definition = Some(type_definition);
        decl
    }

    pub fn variable(
        node_id: NodeId,
        browse_name: QualifiedName,
        data_type: NodeId,
        type_definition: NodeId,
    ) -> Self {
        let mut decl = Self::new(node_id, browse_name, NodeClass::Variable);
        decl.data_type = Some(data_type);
        decl.type_definition = Some(type_definition);
        decl
    }

    pub fn method(node_id: NodeId, browse_name: QualifiedName) -> Self {
        Self::new(node_id, browse_name, NodeClass::Method)
    }

    pub fn with_modelling_rule(mut self, rule: ModellingRule) -> Self {
        self.modelling_rule = rule.node_id();
        self
    }

    /// Declare a modelling rule by raw object id, as a NodeSet would.
    pub fn with_modelling_rule_id(mut self, rule: NodeId) -> Self {
        self.modelling_rule = rule;
        self
    }

    pub fn with_value(mut self, value: impl Into<Variant>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_access_level(mut self, access_level: u8) -> Self {
        self.access_level = access_level;
        self
    }

    pub fn with_value_rank(mut self, value_rank: i32) -> Self {
        self.value_rank = value_rank;
        self
    }

    pub fn with_description(mut self, text: &str) -> Self {
        self.description = Some(LocalizedText::new("", text));
        self
    }

    pub fn with_display_name(mut self, text: &str) -> Self {
        self.display_name = Some(LocalizedText::new("", text));
        self
    }

    pub fn with_arguments(mut self, arguments: Arc<[MethodArgument]>) -> Self {
        self.arguments = Some(arguments);
        self
    }

    /// Declared modelling rule, if one is set and recognized.
    #[inline]
    pub fn declared_modelling_rule(&self) -> Option<ModellingRule> {
        ModellingRule::from_node_id(&self.modelling_rule)
    }
}

/// An owned, nested declaration. Children are kept in declared order.
#[derive(Debug, Clone)]
pub struct DeclarationTree {
    pub declaration: Declaration,
    pub children: Vec<(ReferenceKind, DeclarationTree)>,
}

impl DeclarationTree {
    pub fn new(declaration: Declaration) -> Self {
        Self {
            declaration,
            children: Vec::new(),
        }
    }

    pub fn component(mut self, child: DeclarationTree) -> Self {
        self.children.push((ReferenceKind::HasComponent, child));
        self
    }

    pub fn property(mut self, child: DeclarationTree) -> Self {
        self.children.push((ReferenceKind::HasProperty, child));
        self
    }

    /// Declarations in pre-order, root first.
    pub fn walk(&self) -> Vec<&Declaration> {
        let mut out = vec![&self.declaration];
        for (_, child) in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(usize);

#[derive(Debug)]
struct DeclEntry {
    declaration: Declaration,
    children: Vec<(ReferenceKind, DeclId)>,
}

/// Flat storage for one declaration tree (or several).
#[derive(Debug, Default)]
pub struct DeclarationArena {
    entries: Vec<DeclEntry>,
}

impl DeclarationArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an arena holding `tree`, returning it with the root id.
    pub fn from_tree(tree: &DeclarationTree) -> (Self, DeclId) {
        let mut arena = Self::new();
        let root = arena.add_tree(None, tree);
        (arena, root)
    }

    pub fn add_root(&mut self, declaration: Declaration) -> DeclId {
        self.push(declaration)
    }

    pub fn add_child(
        &mut self,
        parent: DeclId,
        reference: ReferenceKind,
        declaration: Declaration,
    ) -> DeclId {
        let id = self.push(declaration);
        self.entries[parent.0].children.push((reference, id));
        id
    }

    /// Copy `tree` into the arena, either as a new root or under `parent`.
    pub fn add_tree(
        &mut self,
        parent: Option<(DeclId, ReferenceKind)>,
        tree: &DeclarationTree,
    ) -> DeclId {
        let id = match parent {
            Some((parent, reference)) => self.add_child(parent, reference, tree.declaration.clone()),
            None => self.add_root(tree.declaration.clone()),
        };
        for (reference, child) in &tree.children {
            self.add_tree(Some((id, *reference)), child);
        }
        id
    }

    fn push(&mut self, declaration: Declaration) -> DeclId {
        self.entries.push(DeclEntry {
            declaration,
            children: Vec::new(),
        });
        DeclId(self.entries.len() - 1)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn children(&self, id: DeclId) -> &[(ReferenceKind, DeclId)] {
        &self.entries[id.0].children
    }

    /// Every node hierarchically reachable from `root`, in stable pre-order,
    /// excluding `root` itself.
    pub fn hierarchically_referenced_nodes(&self, root: DeclId) -> Vec<DeclId> {
        let mut out = Vec::new();
        let mut stack: Vec<DeclId> = self
            .children(root)
            .iter()
            .rev()
            .filter(|(r, _)| r.is_hierarchical())
            .map(|(_, id)| *id)
            .collect();
        while let Some(id) = stack.pop() {
            if out.contains(&id) {
                continue;
            }
            out.push(id);
            stack.extend(
                self.children(id)
                    .iter()
                    .rev()
                    .filter(|(r, _)| r.is_hierarchical())
                    .map(|(_, child)| *child),
            );
        }
        out
    }
}

impl Index<DeclId> for DeclarationArena {
    type Output = Declaration;

    fn index(&self, id: DeclId) -> &Self::Output {
        &self.entries[id.0].declaration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use opcua::types::DataTypeId;

    fn var(id: &str) -> Declaration {
        Declaration::variable(
            NodeId::new(2, id.to_string()),
            QualifiedName::new(2, id),
            DataTypeId::Double.into(),
            builtin::base_data_variable_type(),
        )
    }

    #[test]
    fn test_pre_order_walk() {
        let tree = DeclarationTree::new(Declaration::object(
            NodeId::new(2, "Root"),
            QualifiedName::new(2, "Root"),
            builtin::base_object_type(),
        ))
        .component(DeclarationTree::new(var("A")).property(DeclarationTree::new(var("A1"))))
        .component(DeclarationTree::new(var("B")));

        let (arena, root) = DeclarationArena::from_tree(&tree);
        let names: Vec<String> = arena
            .hierarchically_referenced_nodes(root)
            .into_iter()
            .map(|id| arena[id].browse_name.name.as_ref().to_string())
            .collect();
        assert_eq!(names, vec!["A", "A1", "B"]);
        assert_eq!(arena.len(), 4);
        assert_eq!(tree.walk().len(), 4);
    }

    #[test]
    fn test_modelling_rule_declaration() {
        assert_eq!(var("A").declared_modelling_rule(), None);
        let decl = var("A").with_modelling_rule(ModellingRule::Optional);
        assert_eq!(decl.declared_modelling_rule(), Some(ModellingRule::Optional));
        let decl = var("A").with_modelling_rule_id(NodeId::null());
        assert_eq!(decl.declared_modelling_rule(), None);
    }
}
