//! Static shape of a type: the children its template carries, in declared
//! order, and how the type's runtime objects are produced.

use crate::{
    builtin,
    declaration::DeclarationTree,
    instance::Instance,
    node::{MethodArgument, ModellingRule, NodeClass, ReferenceKind, ACCESS_CURRENT_READ},
    object::{GenericObject, UaObject},
};
use opcua::types::{NodeId, QualifiedName, Variant};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum TypeKind {
    Object,
    Variable {
        data_type: NodeId,
        value_rank: i32,
        access_level: u8,
        default_value: Variant,
    },
}

/// A method child together with its fixed signature.
#[derive(Debug, Clone)]
pub struct MethodLayout {
    pub node_id: NodeId,
    pub browse_name: QualifiedName,
    pub input_arguments_id: Option<NodeId>,
    pub output_arguments_id: Option<NodeId>,
    pub input: Arc<[MethodArgument]>,
    pub output: Arc<[MethodArgument]>,
}

impl MethodLayout {
    pub fn new(node_id: NodeId, browse_name: QualifiedName) -> Self {
        Self {
            node_id,
            browse_name,
            input_arguments_id: None,
            output_arguments_id: None,
            input: Arc::from(Vec::new()),
            output: Arc::from(Vec::new()),
        }
    }

    pub fn with_input(mut self, arguments_id: NodeId, arguments: Vec<MethodArgument>) -> Self {
        self.input_arguments_id = Some(arguments_id);
        self.input = arguments.into();
        self
    }

    pub fn with_output(mut self, arguments_id: NodeId, arguments: Vec<MethodArgument>) -> Self {
        self.output_arguments_id = Some(arguments_id);
        self.output = arguments.into();
        self
    }
}

#[derive(Debug, Clone)]
pub enum ChildShape {
    /// Object or variable child, built through the instance factory from a
    /// temporary declaration.
    Declared(DeclarationTree),
    Method(MethodLayout),
}

#[derive(Debug, Clone)]
pub struct ChildLayout {
    pub reference: ReferenceKind,
    pub modelling_rule: ModellingRule,
    pub shape: ChildShape,
}

impl ChildLayout {
    pub fn component(modelling_rule: ModellingRule, tree: DeclarationTree) -> Self {
        Self {
            reference: ReferenceKind::HasComponent,
            modelling_rule,
            shape: ChildShape::Declared(tree),
        }
    }

    pub fn property(modelling_rule: ModellingRule, tree: DeclarationTree) -> Self {
        Self {
            reference: ReferenceKind::HasProperty,
            modelling_rule,
            shape: ChildShape::Declared(tree),
        }
    }

    pub fn method(modelling_rule: ModellingRule, method: MethodLayout) -> Self {
        Self {
            reference: ReferenceKind::HasComponent,
            modelling_rule,
            shape: ChildShape::Method(method),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        match &self.shape {
            ChildShape::Declared(tree) => &tree.declaration.node_id,
            ChildShape::Method(method) => &method.node_id,
        }
    }

    pub fn browse_name(&self) -> &QualifiedName {
        match &self.shape {
            ChildShape::Declared(tree) => &tree.declaration.browse_name,
            ChildShape::Method(method) => &method.browse_name,
        }
    }

    pub fn node_class(&self) -> NodeClass {
        match &self.shape {
            ChildShape::Declared(tree) => tree.declaration.node_class,
            ChildShape::Method(_) => NodeClass::Method,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeLayout {
    pub type_id: NodeId,
    pub browse_name: QualifiedName,
    pub is_abstract: bool,
    pub super_type: NodeId,
    pub kind: TypeKind,
    pub children: Vec<ChildLayout>,
}

impl TypeLayout {
    /// A concrete ObjectType deriving from BaseObjectType.
    pub fn object(type_id: NodeId, browse_name: QualifiedName) -> Self {
        Self {
            type_id,
            browse_name,
            is_abstract: false,
            super_type: builtin::base_object_type(),
            kind: TypeKind::Object,
            children: Vec::new(),
        }
    }

    /// A concrete scalar VariableType deriving from BaseDataVariableType.
    pub fn variable(type_id: NodeId, browse_name: QualifiedName, data_type: NodeId) -> Self {
        Self {
            type_id,
            browse_name,
            is_abstract: false,
            super_type: builtin::base_data_variable_type(),
            kind: TypeKind::Variable {
                data_type,
                value_rank: -1,
                access_level: ACCESS_CURRENT_READ,
                default_value: Variant::Empty,
            },
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: ChildLayout) -> Self {
        self.children.push(child);
        self
    }

    pub fn child(&self, name: &str) -> Option<&ChildLayout> {
        self.children
            .iter()
            .find(|c| c.browse_name().name.as_ref() == name)
    }

    #[inline]
    pub fn is_object_type(&self) -> bool {
        matches!(self.kind, TypeKind::Object)
    }
}

/// A type the instance factory can construct.
pub trait TypeModel: Send + Sync + 'static {
    fn layout(&self) -> &TypeLayout;

    /// Wrap a built object instance into this type's runtime object.
    fn wrap(&self, instance: Instance) -> Arc<dyn UaObject> {
        Arc::new(GenericObject::new(instance))
    }

    /// Drop any per-type state when the type's template is torn down.
    fn clear_static_members(&self) {}
}
