use crate::{
    graph::SharedGraph,
    node::{MethodArgument, NodeClass, ReferenceKind},
};
use opcua::types::{NodeId, QualifiedName, Variant};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use ua_model_error::{ModelError, ModelResult};

/// Lock shared by every node of one instance tree. When present, value reads
/// and writes through the instance go through it.
pub type SharedMutex = Arc<Mutex<()>>;

pub fn shared_mutex() -> SharedMutex {
    Arc::new(Mutex::new(()))
}

/// A child slot of an instance after construction.
#[derive(Debug, Clone)]
pub struct BoundChild {
    pub browse_name: QualifiedName,
    pub node_id: NodeId,
    pub node_class: NodeClass,
    pub reference: ReferenceKind,
}

/// A method of an instance, together with the template method it came from.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub browse_name: QualifiedName,
    pub node_id: NodeId,
    pub template_node_id: Option<NodeId>,
    pub input: Arc<[MethodArgument]>,
    pub output: Arc<[MethodArgument]>,
}

impl BoundMethod {
    /// Calls may address either the instance's own method node or the
    /// template method it was created from.
    pub fn matches(&self, method_id: &NodeId) -> bool {
        &self.node_id == method_id || self.template_node_id.as_ref() == Some(method_id)
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.browse_name.name.as_ref()
    }
}

/// Handle to a constructed object or variable tree.
pub struct Instance {
    node_id: NodeId,
    browse_name: QualifiedName,
    type_id: NodeId,
    node_class: NodeClass,
    children: Vec<BoundChild>,
    methods: Vec<BoundMethod>,
    graph: SharedGraph,
    shared_mutex: Option<SharedMutex>,
}

impl Instance {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        node_id: NodeId,
        browse_name: QualifiedName,
        type_id: NodeId,
        node_class: NodeClass,
        children: Vec<BoundChild>,
        methods: Vec<BoundMethod>,
        graph: SharedGraph,
        shared_mutex: Option<SharedMutex>,
    ) -> Self {
        Self {
            node_id,
            browse_name,
            type_id,
            node_class,
            children,
            methods,
            graph,
            shared_mutex,
        }
    }

    #[inline]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    #[inline]
    pub fn browse_name(&self) -> &QualifiedName {
        &self.browse_name
    }

    #[inline]
    pub fn type_id(&self) -> &NodeId {
        &self.type_id
    }

    #[inline]
    pub fn node_class(&self) -> NodeClass {
        self.node_class
    }

    pub fn children(&self) -> &[BoundChild] {
        &self.children
    }

    pub fn methods(&self) -> &[BoundMethod] {
        &self.methods
    }

    pub fn child(&self, name: &str) -> Option<&BoundChild> {
        self.children
            .iter()
            .find(|c| c.browse_name.name.as_ref() == name)
    }

    pub fn method(&self, name: &str) -> Option<&BoundMethod> {
        self.methods.iter().find(|m| m.name() == name)
    }

    pub fn method_by_id(&self, method_id: &NodeId) -> Option<&BoundMethod> {
        self.methods.iter().find(|m| m.matches(method_id))
    }

    pub fn shared_mutex(&self) -> Option<&SharedMutex> {
        self.shared_mutex.as_ref()
    }

    /// Hold the instance's shared mutex (if any) for a sequence of accesses.
    pub fn lock(&self) -> InstanceGuard<'_> {
        let guard = self
            .shared_mutex
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner));
        InstanceGuard {
            instance: self,
            _guard: guard,
        }
    }

    /// Read the value at a browse path below this instance.
    pub fn read(&self, path: &[&str]) -> ModelResult<Variant> {
        self.lock().read(path)
    }

    /// Write the value at a browse path below this instance. Server-side
    /// writes are not subject to the node's access level.
    pub fn write(&self, path: &[&str], value: Variant) -> ModelResult<()> {
        self.lock().write(path, value)
    }
}

/// Accesses made while holding an instance's shared mutex.
pub struct InstanceGuard<'a> {
    instance: &'a Instance,
    _guard: Option<MutexGuard<'a, ()>>,
}

impl InstanceGuard<'_> {
    fn resolve(&self, path: &[&str]) -> ModelResult<NodeId> {
        self.instance
            .graph
            .read()
            .browse_path(&self.instance.node_id, path)
            .ok_or_else(|| {
                ModelError::NodeNotFound(format!("{}/{}", self.instance.node_id, path.join("/")))
            })
    }

    pub fn read(&self, path: &[&str]) -> ModelResult<Variant> {
        let node_id = self.resolve(path)?;
        let graph = self.instance.graph.read();
        Ok(graph.value(&node_id)?.value.clone())
    }

    pub fn write(&self, path: &[&str], value: Variant) -> ModelResult<()> {
        let node_id = self.resolve(path)?;
        self.instance.graph.write().set_value(&node_id, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::NodeGraph,
        node::{Node, ReferenceKind},
    };
    use opcua::types::DataTypeId;

    fn instance_with_level(mutex: Option<SharedMutex>) -> Instance {
        let mut graph = NodeGraph::new();
        let root = NodeId::new(2, "Tank");
        graph
            .insert_node(Node::folder(root.clone(), QualifiedName::new(2, "Tank")))
            .unwrap();
        graph
            .add_node_and_reference(
                &root,
                Node::variable(
                    NodeId::new(2, "Tank.Level"),
                    QualifiedName::new(2, "Level"),
                    DataTypeId::Double.into(),
                    Variant::Double(0.0),
                ),
                ReferenceKind::HasComponent,
            )
            .unwrap();
        Instance::new(
            root,
            QualifiedName::new(2, "Tank"),
            NodeId::new(2, 1u32),
            NodeClass::Object,
            Vec::new(),
            vec![BoundMethod {
                browse_name: QualifiedName::new(2, "Drain"),
                node_id: NodeId::new(2, "Tank.Drain"),
                template_node_id: Some(NodeId::new(2, 7000u32)),
                input: Arc::from(Vec::new()),
                output: Arc::from(Vec::new()),
            }],
            graph.shared(),
            mutex,
        )
    }

    #[test]
    fn test_read_write_under_shared_mutex() {
        let instance = instance_with_level(Some(shared_mutex()));
        instance.write(&["Level"], Variant::Double(3.0)).unwrap();
        assert_eq!(instance.read(&["Level"]).unwrap(), Variant::Double(3.0));

        let guard = instance.lock();
        guard.write(&["Level"], Variant::Double(4.0)).unwrap();
        assert_eq!(guard.read(&["Level"]).unwrap(), Variant::Double(4.0));
        assert!(instance
            .shared_mutex()
            .map(|m| m.try_lock().is_err())
            .unwrap_or(false));
    }

    #[test]
    fn test_unknown_path() {
        let instance = instance_with_level(None);
        let err = instance.read(&["Missing"]).unwrap_err();
        assert!(matches!(err, ModelError::NodeNotFound(_)));
    }

    #[test]
    fn test_method_matches_instance_and_template_ids() {
        let instance = instance_with_level(None);
        assert!(instance.method_by_id(&NodeId::new(2, "Tank.Drain")).is_some());
        assert!(instance.method_by_id(&NodeId::new(2, 7000u32)).is_some());
        assert!(instance.method_by_id(&NodeId::new(2, 7001u32)).is_none());
        assert_eq!(instance.method("Drain").map(|m| m.name()), Some("Drain"));
    }
}
