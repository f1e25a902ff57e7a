//! Instance factory.
//!
//! Dispatch is keyed by namespace index, then by the declared type
//! definition. Namespace 0 uses a fixed built-in mapping; every other
//! namespace registers one `NamespaceFactory` at startup. Resolution rules:
//!
//! - no type definition: generic node
//! - namespace 0: generic when the type is one of the built-in generic
//!   types, unresolved otherwise
//! - namespace without a sub-factory: generic, with a warning
//! - namespace with a sub-factory that does not know the type: unresolved
//!
//! An unresolved type is a hard construction error.

use crate::{
    builder::{self, add_argument_properties, BuildContext},
    builtin,
    declaration::{DeclId, Declaration, DeclarationArena},
    instance::{BoundChild, Instance},
    layout::{TypeKind, TypeLayout, TypeModel},
    node::{MethodArgument, ModellingRule, Node, NodeClass, ReferenceKind},
    object::{GenericObject, UaObject},
};
use dashmap::DashMap;
use opcua::types::{DataTypeId, NodeId, QualifiedName, Variant};
use std::sync::Arc;
use tracing::{debug, info, warn};
use ua_model_error::{ModelError, ModelResult};

/// Per-namespace sub-factory.
pub trait NamespaceFactory: Send + Sync + 'static {
    fn namespace_index(&self) -> u16;

    /// Model of a type defined in this namespace.
    fn type_model(&self, type_id: &NodeId) -> Option<Arc<dyn TypeModel>>;

    /// Default value for variables of a data type defined in this namespace.
    fn default_value(&self, _data_type: &NodeId, _value_rank: i32) -> Option<Variant> {
        None
    }
}

enum Resolved {
    Generic,
    Typed(Arc<dyn TypeModel>),
}

#[derive(Default)]
pub struct InstanceFactory {
    namespaces: DashMap<u16, Arc<dyn NamespaceFactory>>,
}

impl InstanceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the sub-factory of a namespace. There is no unregister; a
    /// namespace gets exactly one sub-factory.
    pub fn register(&self, factory: Arc<dyn NamespaceFactory>) -> ModelResult<()> {
        let index = factory.namespace_index();
        if index == 0 {
            return Err(ModelError::InvalidStateError(
                "namespace 0 is served by the built-in mapping".to_string(),
            ));
        }
        if self.namespaces.contains_key(&index) {
            return Err(ModelError::InvalidStateError(format!(
                "namespace {index} already has a factory"
            )));
        }
        self.namespaces.insert(index, factory);
        info!(namespace = index, "Namespace factory registered");
        Ok(())
    }

    pub fn is_registered(&self, namespace: u16) -> bool {
        self.namespaces.contains_key(&namespace)
    }

    pub fn type_model(&self, type_id: &NodeId) -> Option<Arc<dyn TypeModel>> {
        self.namespaces
            .get(&type_id.namespace)
            .and_then(|f| f.type_model(type_id))
    }

    pub fn default_value(&self, data_type: &NodeId, value_rank: i32) -> Variant {
        if data_type.namespace == 0 {
            return builtin::default_value(data_type, value_rank);
        }
        self.namespaces
            .get(&data_type.namespace)
            .and_then(|f| f.default_value(data_type, value_rank))
            .unwrap_or(Variant::Empty)
    }

    fn resolve(
        &self,
        type_definition: Option<&NodeId>,
        node_class: NodeClass,
    ) -> ModelResult<Resolved> {
        let Some(type_definition) = type_definition.filter(|t| !t.is_null()) else {
            return Ok(Resolved::Generic);
        };
        let unresolved = || ModelError::UnresolvedType {
            namespace: type_definition.namespace,
            type_definition: type_definition.to_string(),
        };
        if type_definition.namespace == 0 {
            let generic = match node_class {
                NodeClass::Object => builtin::is_generic_object_type(type_definition),
                NodeClass::Variable => builtin::is_generic_variable_type(type_definition),
                _ => false,
            };
            return if generic {
                Ok(Resolved::Generic)
            } else {
                Err(unresolved())
            };
        }
        match self.namespaces.get(&type_definition.namespace) {
            Some(factory) => factory
                .type_model(type_definition)
                .map(Resolved::Typed)
                .ok_or_else(unresolved),
            None => {
                warn!(
                    type_definition = %type_definition,
                    "No factory for namespace, creating generic node"
                );
                Ok(Resolved::Generic)
            }
        }
    }

    /// Create the object declared at `id` under `parent`, dispatching on its
    /// type definition.
    pub fn create_object(
        &self,
        cx: &mut BuildContext<'_>,
        arena: &DeclarationArena,
        id: DeclId,
        parent: &NodeId,
        reference: ReferenceKind,
    ) -> ModelResult<Arc<dyn UaObject>> {
        let declaration = &arena[id];
        let resolved = self.resolve(declaration.type_definition.as_ref(), NodeClass::Object)?;
        let object: Arc<dyn UaObject> = match resolved {
            Resolved::Typed(model) => {
                expect_object_type(model.layout(), declaration)?;
                let instance =
                    builder::instantiate_declared(cx, model.as_ref(), arena, id, parent, reference)?;
                model.wrap(instance)
            }
            Resolved::Generic => {
                let type_id = declaration
                    .type_definition
                    .clone()
                    .unwrap_or_else(builtin::base_object_type);
                let node = declared_node(
                    declaration,
                    Node::object(
                        declaration.node_id.clone(),
                        declaration.browse_name.clone(),
                        type_id.clone(),
                    ),
                );
                cx.add_node_and_reference(parent, node, reference)?;
                let children = self.create_declared_children(cx, arena, id)?;
                let instance = cx.new_instance(
                    (
                        declaration.node_id.clone(),
                        declaration.browse_name.clone(),
                        NodeClass::Object,
                    ),
                    type_id,
                    children,
                    Vec::new(),
                );
                Arc::new(GenericObject::new(instance))
            }
        };
        cx.track(Arc::clone(&object));
        Ok(object)
    }

    /// Create the variable declared at `id` under `parent`.
    pub fn create_variable(
        &self,
        cx: &mut BuildContext<'_>,
        arena: &DeclarationArena,
        id: DeclId,
        parent: &NodeId,
        reference: ReferenceKind,
    ) -> ModelResult<NodeId> {
        let declaration = &arena[id];
        match self.resolve(declaration.type_definition.as_ref(), NodeClass::Variable)? {
            Resolved::Typed(model) => {
                if model.layout().is_object_type() {
                    return Err(class_mismatch(model.layout(), declaration));
                }
                let instance =
                    builder::instantiate_declared(cx, model.as_ref(), arena, id, parent, reference)?;
                Ok(instance.node_id().clone())
            }
            Resolved::Generic => {
                let data_type = declaration
                    .data_type
                    .clone()
                    .unwrap_or_else(|| DataTypeId::BaseDataType.into());
                let value = match &declaration.value {
                    Variant::Empty => self.default_value(&data_type, declaration.value_rank),
                    value => value.clone(),
                };
                let mut node = Node::variable(
                    declaration.node_id.clone(),
                    declaration.browse_name.clone(),
                    data_type,
                    value,
                )
                .with_value_rank(declaration.value_rank)
                .with_access_level(declaration.access_level);
                if let Some(type_definition) = &declaration.type_definition {
                    node = node.with_type_definition(type_definition.clone());
                }
                cx.add_node_and_reference(parent, declared_node(declaration, node), reference)?;
                self.create_declared_children(cx, arena, id)?;
                Ok(declaration.node_id.clone())
            }
        }
    }

    /// Create the method node declared at `id`. Argument properties are not
    /// taken from the declaration's children.
    pub fn create_method(
        &self,
        cx: &mut BuildContext<'_>,
        arena: &DeclarationArena,
        id: DeclId,
        parent: &NodeId,
        reference: ReferenceKind,
    ) -> ModelResult<NodeId> {
        let declaration = &arena[id];
        let node = declared_node(
            declaration,
            Node::method(declaration.node_id.clone(), declaration.browse_name.clone()),
        );
        cx.add_node_and_reference(parent, node, reference)?;
        Ok(declaration.node_id.clone())
    }

    /// Create every hierarchical child declared under `id`, in declared order.
    pub fn create_declared_children(
        &self,
        cx: &mut BuildContext<'_>,
        arena: &DeclarationArena,
        id: DeclId,
    ) -> ModelResult<Vec<BoundChild>> {
        let parent = &arena[id].node_id;
        let mut bound = Vec::new();
        for &(reference, child) in arena.children(id) {
            if !reference.is_hierarchical() {
                continue;
            }
            let declaration = &arena[child];
            match declaration.node_class {
                NodeClass::Object => {
                    self.create_object(cx, arena, child, parent, reference)?;
                }
                NodeClass::Variable => {
                    self.create_variable(cx, arena, child, parent, reference)?;
                }
                NodeClass::Method => {
                    let method_id = self.create_method(cx, arena, child, parent, reference)?;
                    if let Some(arguments) = &declaration.arguments {
                        let empty: Arc<[MethodArgument]> = Arc::from(Vec::new());
                        add_argument_properties(
                            cx,
                            &method_id,
                            (None, arguments),
                            (None, &empty),
                            None,
                        )?;
                    }
                }
                other => {
                    debug!(
                        node_id = %declaration.node_id,
                        node_class = ?other,
                        "Skipping declared child"
                    );
                    continue;
                }
            }
            bound.push(BoundChild {
                browse_name: declaration.browse_name.clone(),
                node_id: declaration.node_id.clone(),
                node_class: declaration.node_class,
                reference,
            });
        }
        Ok(bound)
    }

    /// Fresh instantiation of the template object `source` under a new id.
    pub fn instantiate_object(
        &self,
        cx: &mut BuildContext<'_>,
        source: &NodeId,
        node_id: NodeId,
        parent: &NodeId,
        reference: ReferenceKind,
    ) -> ModelResult<Arc<dyn UaObject>> {
        let (browse_name, type_definition) = {
            let graph = cx.space().graph().read();
            let node = graph
                .node(source)
                .ok_or_else(|| ModelError::ConfigurationFatal(format!("declaration {source} is gone")))?;
            (node.browse_name.clone(), node.type_definition.clone())
        };
        let object: Arc<dyn UaObject> = match self.resolve(type_definition.as_ref(), NodeClass::Object)? {
            Resolved::Typed(model) => {
                let root = Node::object(node_id, browse_name, model.layout().type_id.clone());
                return self.instantiate_model(cx, model, root, parent, reference);
            }
            Resolved::Generic => {
                let children =
                    builder::copy_declaration_node(cx, source, node_id.clone(), parent, reference)?;
                let instance = cx.new_instance(
                    (node_id, browse_name, NodeClass::Object),
                    type_definition.unwrap_or_else(builtin::base_object_type),
                    children,
                    Vec::new(),
                );
                Arc::new(GenericObject::new(instance))
            }
        };
        cx.track(Arc::clone(&object));
        Ok(object)
    }

    /// Fresh instantiation of an object of `type_id` rooted at a new node.
    pub fn instantiate_type(
        &self,
        cx: &mut BuildContext<'_>,
        type_id: &NodeId,
        node_id: NodeId,
        browse_name: QualifiedName,
        parent: &NodeId,
        reference: ReferenceKind,
    ) -> ModelResult<Arc<dyn UaObject>> {
        let model = self.require_model(type_id)?;
        if !model.layout().is_object_type() {
            return Err(ModelError::TypeMismatch(format!("{type_id} is not an ObjectType")));
        }
        let root = Node::object(node_id, browse_name, type_id.clone());
        self.instantiate_model(cx, model, root, parent, reference)
    }

    /// Fresh instantiation of a variable of `type_id`.
    pub fn instantiate_variable_type(
        &self,
        cx: &mut BuildContext<'_>,
        type_id: &NodeId,
        node_id: NodeId,
        browse_name: QualifiedName,
        parent: &NodeId,
        reference: ReferenceKind,
    ) -> ModelResult<Instance> {
        let model = self.require_model(type_id)?;
        let layout = model.layout();
        let TypeKind::Variable {
            data_type,
            value_rank,
            access_level,
            default_value,
        } = &layout.kind
        else {
            return Err(ModelError::TypeMismatch(format!("{type_id} is not a VariableType")));
        };
        let value = match default_value {
            Variant::Empty => self.default_value(data_type, *value_rank),
            value => value.clone(),
        };
        let root = Node::variable(node_id, browse_name, data_type.clone(), value)
            .with_value_rank(*value_rank)
            .with_access_level(*access_level)
            .with_type_definition(type_id.clone());
        builder::instantiate_fresh(cx, model.as_ref(), root, parent, reference)
    }

    fn instantiate_model(
        &self,
        cx: &mut BuildContext<'_>,
        model: Arc<dyn TypeModel>,
        root: Node,
        parent: &NodeId,
        reference: ReferenceKind,
    ) -> ModelResult<Arc<dyn UaObject>> {
        let instance = builder::instantiate_fresh(cx, model.as_ref(), root, parent, reference)?;
        let object = model.wrap(instance);
        cx.track(Arc::clone(&object));
        Ok(object)
    }

    fn require_model(&self, type_id: &NodeId) -> ModelResult<Arc<dyn TypeModel>> {
        self.type_model(type_id).ok_or_else(|| ModelError::UnresolvedType {
            namespace: type_id.namespace,
            type_definition: type_id.to_string(),
        })
    }

    /// Root node of a declaration-matched instance of `layout`.
    pub fn root_from_declaration(
        &self,
        declaration: &Declaration,
        layout: &TypeLayout,
    ) -> ModelResult<Node> {
        let node = match &layout.kind {
            TypeKind::Object => Node::object(
                declaration.node_id.clone(),
                declaration.browse_name.clone(),
                layout.type_id.clone(),
            ),
            TypeKind::Variable {
                data_type,
                default_value,
                ..
            } => {
                let data_type = declaration.data_type.clone().unwrap_or_else(|| data_type.clone());
                let value = match (&declaration.value, default_value) {
                    (Variant::Empty, Variant::Empty) => {
                        self.default_value(&data_type, declaration.value_rank)
                    }
                    (Variant::Empty, value) => value.clone(),
                    (value, _) => value.clone(),
                };
                Node::variable(
                    declaration.node_id.clone(),
                    declaration.browse_name.clone(),
                    data_type,
                    value,
                )
                .with_value_rank(declaration.value_rank)
                .with_access_level(declaration.access_level)
                .with_type_definition(layout.type_id.clone())
            }
        };
        Ok(declared_node(declaration, node))
    }
}

/// Copy the attributes every declared node carries onto `node`. A declared
/// modelling rule is copied only when it is set.
fn declared_node(declaration: &Declaration, mut node: Node) -> Node {
    if let Some(display_name) = &declaration.display_name {
        node.display_name = display_name.clone();
    }
    node.description = declaration.description.clone();
    let rule: Option<ModellingRule> = declaration.declared_modelling_rule();
    if rule.is_some() {
        node.modelling_rule = rule;
    }
    node
}

fn expect_object_type(layout: &TypeLayout, declaration: &Declaration) -> ModelResult<()> {
    if layout.is_object_type() {
        Ok(())
    } else {
        Err(class_mismatch(layout, declaration))
    }
}

fn class_mismatch(layout: &TypeLayout, declaration: &Declaration) -> ModelError {
    ModelError::ConfigurationFatal(format!(
        "{:?} {} cannot be typed by {}",
        declaration.node_class, declaration.node_id, layout.browse_name.name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty(u16);

    impl NamespaceFactory for Empty {
        fn namespace_index(&self) -> u16 {
            self.0
        }

        fn type_model(&self, _type_id: &NodeId) -> Option<Arc<dyn TypeModel>> {
            None
        }
    }

    #[test]
    fn test_resolution_rules() {
        let factory = InstanceFactory::new();
        factory.register(Arc::new(Empty(2))).unwrap();

        assert!(matches!(factory.resolve(None, NodeClass::Object), Ok(Resolved::Generic)));
        assert!(matches!(
            factory.resolve(Some(&builtin::folder_type()), NodeClass::Object),
            Ok(Resolved::Generic)
        ));
        assert!(matches!(
            factory.resolve(Some(&builtin::analog_item_type()), NodeClass::Variable),
            Ok(Resolved::Generic)
        ));
        // Namespace 0 types outside the built-in mapping do not fall back.
        assert!(matches!(
            factory.resolve(Some(&builtin::analog_item_type()), NodeClass::Object),
            Err(ModelError::UnresolvedType { namespace: 0, .. })
        ));
        // Known namespace, unknown type.
        assert!(matches!(
            factory.resolve(Some(&NodeId::new(2, 1001u32)), NodeClass::Object),
            Err(ModelError::UnresolvedType { namespace: 2, .. })
        ));
        // No sub-factory for the namespace.
        assert!(matches!(
            factory.resolve(Some(&NodeId::new(3, 1001u32)), NodeClass::Object),
            Ok(Resolved::Generic)
        ));
    }

    #[test]
    fn test_register_once_per_namespace() {
        let factory = InstanceFactory::new();
        factory.register(Arc::new(Empty(2))).unwrap();
        assert!(factory.register(Arc::new(Empty(2))).is_err());
        assert!(factory.register(Arc::new(Empty(0))).is_err());
        assert!(factory.is_registered(2));
    }

    #[test]
    fn test_default_values() {
        let factory = InstanceFactory::new();
        assert_eq!(
            factory.default_value(&DataTypeId::Double.into(), -1),
            Variant::Double(0.0)
        );
        assert_eq!(factory.default_value(&NodeId::new(4, 3001u32), -1), Variant::Empty);
    }
}
