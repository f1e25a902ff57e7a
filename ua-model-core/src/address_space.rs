//! Address-space root.
//!
//! Owns the node graph, the namespace table, the type registry, the instance
//! factory and the live object handles. Every construction goes through a
//! `StagedTree` and is committed to the graph in one step.

use crate::{
    builder::BuildContext,
    builtin,
    declaration::{DeclId, DeclarationArena},
    factory::{InstanceFactory, NamespaceFactory},
    graph::{NodeGraph, SharedGraph},
    instance::{Instance, SharedMutex},
    namespace::NamespaceTable,
    node::{Node, ReferenceKind, ACCESS_CURRENT_WRITE},
    node_manager::StagedTree,
    object::UaObject,
    registry::{TypeRegistry, TypeTemplate},
};
use dashmap::DashMap;
use opcua::types::{DataTypeId, NodeId, QualifiedName, Variant};
use std::sync::{Arc, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use ua_model_error::{ModelError, ModelResult};

pub struct AddressSpace {
    graph: SharedGraph,
    namespaces: NamespaceTable,
    registry: Arc<TypeRegistry>,
    factory: InstanceFactory,
    objects: DashMap<NodeId, Arc<dyn UaObject>>,
}

impl AddressSpace {
    /// Create an address space holding the namespace 0 skeleton.
    pub fn new() -> ModelResult<Self> {
        let mut graph = NodeGraph::new();
        seed_base_namespace(&mut graph)
            .map_err(|e| ModelError::InitializationError(format!("namespace 0 skeleton: {e}")))?;
        let graph = graph.shared();
        Ok(Self {
            registry: Arc::new(TypeRegistry::new(Arc::clone(&graph))),
            graph,
            namespaces: NamespaceTable::new(),
            factory: InstanceFactory::new(),
            objects: DashMap::new(),
        })
    }

    #[inline]
    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    #[inline]
    pub fn namespaces(&self) -> &NamespaceTable {
        &self.namespaces
    }

    #[inline]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    #[inline]
    pub fn factory(&self) -> &InstanceFactory {
        &self.factory
    }

    pub fn register_namespace(&self, uri: &str) -> ModelResult<u16> {
        self.namespaces.register(uri)
    }

    pub fn register_factory(&self, factory: Arc<dyn NamespaceFactory>) -> ModelResult<()> {
        let index = factory.namespace_index();
        if self.namespaces.uri(index).is_none() {
            return Err(ModelError::NamespaceNotFound(index.to_string()));
        }
        self.factory.register(factory)
    }

    /// Build the template of `type_id` if it does not exist yet.
    pub fn ensure_type_created(&self, type_id: &NodeId) -> ModelResult<Option<Arc<TypeTemplate>>> {
        self.registry.ensure_type_created(self, type_id)
    }

    pub fn teardown_type(&self, type_id: &NodeId) -> bool {
        self.registry.teardown(type_id)
    }

    pub fn add_folder(&self, parent: &NodeId, node_id: NodeId, name: &str) -> ModelResult<NodeId> {
        let browse_name = QualifiedName::new(node_id.namespace, name);
        self.graph.write().add_node_and_reference(
            parent,
            Node::folder(node_id.clone(), browse_name),
            ReferenceKind::Organizes,
        )?;
        debug!(node_id = %node_id, parent = %parent, "Folder added");
        Ok(node_id)
    }

    /// Instantiate an object of `type_id` from its template.
    ///
    /// When `shared_mutex` is given it is held for the whole construction and
    /// handed to every node of the new tree.
    pub fn create_object(
        &self,
        parent: &NodeId,
        node_id: NodeId,
        browse_name: QualifiedName,
        type_id: &NodeId,
        shared_mutex: Option<SharedMutex>,
    ) -> ModelResult<Arc<dyn UaObject>> {
        let _guard = hold(&shared_mutex);
        let mut staged = StagedTree::new(node_id.namespace);
        let (object, objects) = {
            let mut cx = BuildContext::new(self, &mut staged, shared_mutex.clone());
            let object = self.factory.instantiate_type(
                &mut cx,
                type_id,
                node_id,
                browse_name,
                parent,
                ReferenceKind::Organizes,
            )?;
            (object, cx.into_objects())
        };
        self.commit(staged, objects)?;
        info!(
            node_id = %object.node_id(),
            type_id = %type_id,
            "Object created from template"
        );
        Ok(object)
    }

    /// Instantiate the object described by a declaration tree.
    pub fn create_object_from_declaration(
        &self,
        parent: &NodeId,
        arena: &DeclarationArena,
        root: DeclId,
        shared_mutex: Option<SharedMutex>,
    ) -> ModelResult<Arc<dyn UaObject>> {
        let _guard = hold(&shared_mutex);
        let mut staged = StagedTree::new(arena[root].node_id.namespace);
        let (object, objects) = {
            let mut cx = BuildContext::new(self, &mut staged, shared_mutex.clone());
            let object =
                self.factory
                    .create_object(&mut cx, arena, root, parent, ReferenceKind::Organizes)?;
            (object, cx.into_objects())
        };
        self.commit(staged, objects)?;
        info!(node_id = %object.node_id(), "Object created from declaration");
        Ok(object)
    }

    /// Instantiate a variable of the VariableType `type_id` from its template.
    /// The returned instance carries `shared_mutex`.
    pub fn create_variable(
        &self,
        parent: &NodeId,
        node_id: NodeId,
        browse_name: QualifiedName,
        type_id: &NodeId,
        reference: ReferenceKind,
        shared_mutex: Option<SharedMutex>,
    ) -> ModelResult<Instance> {
        let _guard = hold(&shared_mutex);
        let mut staged = StagedTree::new(node_id.namespace);
        let (instance, objects) = {
            let mut cx = BuildContext::new(self, &mut staged, shared_mutex.clone());
            let instance = self.factory.instantiate_variable_type(
                &mut cx,
                type_id,
                node_id,
                browse_name,
                parent,
                reference,
            )?;
            (instance, cx.into_objects())
        };
        self.commit(staged, objects)?;
        info!(node_id = %instance.node_id(), type_id = %type_id, "Variable created from template");
        Ok(instance)
    }

    /// Create the variable described by a declaration tree.
    pub fn create_variable_from_declaration(
        &self,
        parent: &NodeId,
        arena: &DeclarationArena,
        root: DeclId,
        reference: ReferenceKind,
        shared_mutex: Option<SharedMutex>,
    ) -> ModelResult<NodeId> {
        let _guard = hold(&shared_mutex);
        let mut staged = StagedTree::new(arena[root].node_id.namespace);
        let (node_id, objects) = {
            let mut cx = BuildContext::new(self, &mut staged, shared_mutex.clone());
            let node_id = self
                .factory
                .create_variable(&mut cx, arena, root, parent, reference)?;
            (node_id, cx.into_objects())
        };
        self.commit(staged, objects)?;
        info!(node_id = %node_id, "Variable created from declaration");
        Ok(node_id)
    }

    /// Insert a finished construction and register its object handles.
    pub(crate) fn commit(
        &self,
        staged: StagedTree,
        objects: Vec<Arc<dyn UaObject>>,
    ) -> ModelResult<()> {
        let inserted = self
            .graph
            .write()
            .apply(staged)
            .map_err(|e| e.into_fatal("committing staged nodes"))?;
        for object in objects {
            self.objects.insert(object.node_id().clone(), object);
        }
        debug!(nodes = inserted.len(), "Staged nodes committed");
        Ok(())
    }

    /// Runtime object behind an Object node.
    pub fn object(&self, node_id: &NodeId) -> Option<Arc<dyn UaObject>> {
        self.objects.get(node_id).map(|o| Arc::clone(o.value()))
    }

    pub fn objects_of_type(&self, type_id: &NodeId) -> Vec<Arc<dyn UaObject>> {
        let mut objects: Vec<Arc<dyn UaObject>> = self
            .objects
            .iter()
            .filter(|o| o.value().instance().type_id() == type_id)
            .map(|o| Arc::clone(o.value()))
            .collect();
        objects.sort_by_key(|o| o.node_id().to_string());
        objects
    }

    pub fn read_value(&self, node_id: &NodeId) -> ModelResult<Variant> {
        Ok(self.graph.read().value(node_id)?.value.clone())
    }

    /// Client-facing write. Fails with `AccessDenied` when the variable's
    /// access level lacks the CurrentWrite bit.
    pub fn write_value(&self, node_id: &NodeId, value: Variant) -> ModelResult<()> {
        let mut graph = self.graph.write();
        let node = graph
            .node(node_id)
            .ok_or_else(|| ModelError::NodeNotFound(node_id.to_string()))?;
        let body = node
            .as_variable()
            .ok_or_else(|| ModelError::TypeMismatch(format!("{node_id} is not a variable")))?;
        if body.access_level & ACCESS_CURRENT_WRITE == 0 {
            return Err(ModelError::AccessDenied(format!("{node_id} is not writable")));
        }
        graph.set_value(node_id, value)
    }

    /// Remove a node and its descendants, dropping their object handles.
    pub fn remove_node(&self, node_id: &NodeId) -> usize {
        let removed = self.graph.write().remove_subtree(node_id);
        self.prune_objects();
        removed
    }

    /// Remove every node of a namespace, then run the namespace's teardown
    /// callbacks.
    pub fn clear_namespace(&self, namespace: u16) -> ModelResult<usize> {
        if namespace == 0 {
            return Err(ModelError::InvalidStateError(
                "namespace 0 cannot be cleared".to_string(),
            ));
        }
        if self.namespaces.uri(namespace).is_none() {
            return Err(ModelError::NamespaceNotFound(namespace.to_string()));
        }
        let removed = self.graph.write().remove_namespace(namespace);
        self.prune_objects();
        let hooks = self.namespaces.take_teardown_hooks(namespace);
        let hook_count = hooks.len();
        for hook in hooks {
            hook();
        }
        info!(namespace, removed, hooks = hook_count, "Namespace cleared");
        Ok(removed)
    }

    /// Clear every namespace except 0, newest first.
    pub fn shutdown(&self) -> ModelResult<()> {
        for namespace in self.namespaces.indices().into_iter().rev() {
            if namespace != 0 {
                self.clear_namespace(namespace)?;
            }
        }
        let leftover = self.registry.teardown_all();
        if leftover > 0 {
            warn!(leftover, "Type templates outlived their namespace");
        }
        info!("Address space shut down");
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.graph.read().len()
    }

    fn prune_objects(&self) {
        let graph = self.graph.read();
        self.objects.retain(|node_id, _| graph.contains(node_id));
    }
}

fn hold(shared_mutex: &Option<SharedMutex>) -> Option<MutexGuard<'_, ()>> {
    shared_mutex
        .as_ref()
        .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
}

fn ns0(name: &str) -> QualifiedName {
    QualifiedName::new(0, name)
}

/// The part of the standard namespace 0 instances depend on: the folder
/// hierarchy, the base object and variable types and the modelling rules.
fn seed_base_namespace(graph: &mut NodeGraph) -> ModelResult<()> {
    let base_data_type: NodeId = DataTypeId::BaseDataType.into();

    graph.insert_node(Node::object_type(
        builtin::base_object_type(),
        ns0("BaseObjectType"),
        false,
    ))?;
    for (node_id, name) in [
        (builtin::folder_type(), "FolderType"),
        (builtin::modelling_rule_type(), "ModellingRuleType"),
    ] {
        graph.add_node_and_reference(
            &builtin::base_object_type(),
            Node::object_type(node_id, ns0(name), false),
            ReferenceKind::HasSubtype,
        )?;
    }

    graph.insert_node(Node::variable_type(
        builtin::base_variable_type(),
        ns0("BaseVariableType"),
        base_data_type.clone(),
        -2,
        true,
    ))?;
    for (parent, node_id, name) in [
        (builtin::base_variable_type(), builtin::base_data_variable_type(), "BaseDataVariableType"),
        (builtin::base_variable_type(), builtin::property_type(), "PropertyType"),
        (builtin::base_data_variable_type(), builtin::data_item_type(), "DataItemType"),
        (builtin::data_item_type(), builtin::analog_item_type(), "AnalogItemType"),
    ] {
        graph.add_node_and_reference(
            &parent,
            Node::variable_type(node_id, ns0(name), base_data_type.clone(), -2, false),
            ReferenceKind::HasSubtype,
        )?;
    }

    graph.insert_node(Node::folder(builtin::root_folder(), ns0("Root")))?;
    for (parent, node_id, name) in [
        (builtin::root_folder(), builtin::objects_folder(), "Objects"),
        (builtin::root_folder(), builtin::types_folder(), "Types"),
        (builtin::types_folder(), builtin::object_types_folder(), "ObjectTypes"),
        (builtin::types_folder(), builtin::variable_types_folder(), "VariableTypes"),
    ] {
        graph.add_node_and_reference(
            &parent,
            Node::folder(node_id, ns0(name)),
            ReferenceKind::Organizes,
        )?;
    }
    graph.add_reference(
        &builtin::object_types_folder(),
        &builtin::base_object_type(),
        ReferenceKind::Organizes,
    )?;
    graph.add_reference(
        &builtin::variable_types_folder(),
        &builtin::base_variable_type(),
        ReferenceKind::Organizes,
    )?;

    for (node_id, name) in [
        (builtin::modelling_rule_mandatory(), "Mandatory"),
        (builtin::modelling_rule_optional(), "Optional"),
    ] {
        graph.insert_node(Node::object(node_id, ns0(name), builtin::modelling_rule_type()))?;
    }
    Ok(())
}

impl std::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("nodes", &self.node_count())
            .field("namespaces", &self.namespaces.len())
            .field("objects", &self.objects.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        declaration::Declaration,
        node::{NodeClass, ACCESS_READ_WRITE},
        testing::tank_space,
    };

    #[test]
    fn test_base_namespace_skeleton() {
        let space = AddressSpace::new().unwrap();
        let graph = space.graph().read();
        assert_eq!(
            graph.browse_path(&builtin::root_folder(), &["Objects"]),
            Some(builtin::objects_folder())
        );
        assert_eq!(
            graph.browse_path(
                &builtin::root_folder(),
                &["Types", "ObjectTypes", "BaseObjectType", "FolderType"]
            ),
            Some(builtin::folder_type())
        );
        assert_eq!(
            graph.type_definition(&builtin::objects_folder()),
            Some(builtin::folder_type())
        );
        assert!(graph
            .references(&builtin::objects_folder())
            .iter()
            .any(|r| r.reference_type == ReferenceKind::HasTypeDefinition && r.is_forward));
        assert_eq!(
            graph.node_class(&builtin::modelling_rule_mandatory()),
            Some(NodeClass::Object)
        );
    }

    #[test]
    fn test_write_respects_access_level() {
        let space = AddressSpace::new().unwrap();
        let ns = space.register_namespace("urn:test:values").unwrap();
        let folder = space
            .add_folder(&builtin::objects_folder(), NodeId::new(ns, "Values"), "Values")
            .unwrap();
        {
            let mut graph = space.graph().write();
            for (name, access) in [("ReadOnly", 0x01), ("ReadWrite", ACCESS_READ_WRITE)] {
                graph
                    .add_node_and_reference(
                        &folder,
                        Node::variable(
                            NodeId::new(ns, name),
                            QualifiedName::new(ns, name),
                            DataTypeId::Double.into(),
                            Variant::Double(1.0),
                        )
                        .with_access_level(access),
                        ReferenceKind::HasComponent,
                    )
                    .unwrap();
            }
        }

        let err = space
            .write_value(&NodeId::new(ns, "ReadOnly"), Variant::Double(2.0))
            .unwrap_err();
        assert!(matches!(err, ModelError::AccessDenied(_)));
        space
            .write_value(&NodeId::new(ns, "ReadWrite"), Variant::Double(2.0))
            .unwrap();
        assert_eq!(
            space.read_value(&NodeId::new(ns, "ReadWrite")).unwrap(),
            Variant::Double(2.0)
        );
    }

    #[test]
    fn test_variable_constructors_take_shared_mutex() {
        let (space, ns) = tank_space();
        let tank = space
            .create_object(
                &builtin::objects_folder(),
                NodeId::new(ns, "Tank1"),
                QualifiedName::new(ns, "Tank1"),
                &NodeId::new(ns, 1u32),
                None,
            )
            .unwrap();
        let lock = crate::instance::shared_mutex();

        let mut arena = DeclarationArena::new();
        let root = arena.add_root(Declaration::variable(
            NodeId::new(ns, 6100u32),
            QualifiedName::new(ns, "Pressure"),
            DataTypeId::Double.into(),
            builtin::base_data_variable_type(),
        ));
        let pressure = space
            .create_variable_from_declaration(
                tank.node_id(),
                &arena,
                root,
                ReferenceKind::HasComponent,
                Some(Arc::clone(&lock)),
            )
            .unwrap();
        assert_eq!(pressure, NodeId::new(ns, 6100u32));
        // Released once construction returns.
        assert!(lock.try_lock().is_ok());
        assert_eq!(
            space.graph().read().parent(&pressure),
            Some((ReferenceKind::HasComponent, tank.node_id().clone()))
        );
    }

    #[test]
    fn test_clear_namespace_tears_down_templates() {
        let (space, ns) = tank_space();
        let type_id = NodeId::new(ns, 1u32);
        let tank = space
            .create_object(
                &builtin::objects_folder(),
                NodeId::new(ns, "Tank1"),
                QualifiedName::new(ns, "Tank1"),
                &type_id,
                None,
            )
            .unwrap();
        assert!(space.object(tank.node_id()).is_some());
        assert!(space.registry().is_created(&type_id));

        let before = space.node_count();
        let removed = space.clear_namespace(ns).unwrap();
        assert!(removed > 0);
        assert_eq!(space.node_count(), before - removed);
        assert_eq!(space.graph().read().count_in_namespace(ns), 0);
        assert!(space.object(tank.node_id()).is_none());
        assert!(!space.registry().is_created(&type_id));
        assert!(space.clear_namespace(0).is_err());
    }
}
