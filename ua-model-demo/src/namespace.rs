//! Bring-up of the demo namespace inside an address space.
//!
//! Registers the namespace and its sub-factory, builds every type template
//! up front, and organizes instances under `Objects/Demo/BoilerDemo`.

use crate::{
    factory::DemoNamespaceFactory,
    identifiers::{self as ids, id},
    object::DemoObject,
};
use opcua::types::{NodeId, QualifiedName};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use ua_model_core::{
    builtin, node_id::child_node_id, shared_mutex, AddressSpace, Instance, ReferenceKind,
    SharedMutex, UaObject,
};
use ua_model_error::ModelResult;

pub struct BoilerDemo {
    space: Arc<AddressSpace>,
    namespace: u16,
    factory: Arc<DemoNamespaceFactory>,
    folder: NodeId,
}

impl BoilerDemo {
    /// Register `namespace_uri` with its sub-factory, build the type
    /// templates and create the demo folders.
    #[instrument(name = "register-demo-namespace", skip(space))]
    pub fn register(space: Arc<AddressSpace>, namespace_uri: &str) -> ModelResult<Self> {
        let namespace = space.register_namespace(namespace_uri)?;
        let factory = Arc::new(DemoNamespaceFactory::new(namespace));
        space.register_factory(factory.clone())?;

        for type_id in factory.type_ids() {
            space.ensure_type_created(&type_id)?;
        }

        let demo = space.add_folder(
            &builtin::objects_folder(),
            NodeId::new(namespace, "Demo"),
            "Demo",
        )?;
        let folder = space.add_folder(&demo, child_node_id(&demo, "BoilerDemo"), "BoilerDemo")?;
        info!(
            namespace,
            namespace_uri,
            types = factory.type_ids().len(),
            "Demo namespace registered"
        );

        Ok(Self {
            space,
            namespace,
            factory,
            folder,
        })
    }

    #[inline]
    pub fn namespace(&self) -> u16 {
        self.namespace
    }

    #[inline]
    pub fn folder(&self) -> &NodeId {
        &self.folder
    }

    #[inline]
    pub fn space(&self) -> &Arc<AddressSpace> {
        &self.space
    }

    pub fn boiler_type(&self) -> NodeId {
        id(self.namespace, ids::BOILER_TYPE)
    }

    pub fn machine_type(&self) -> NodeId {
        id(self.namespace, ids::MACHINE_TYPE)
    }

    pub fn work_order_type(&self) -> NodeId {
        id(self.namespace, ids::WORK_ORDER_VARIABLE_TYPE)
    }

    /// Instantiate a boiler from its template. Each boiler gets its own
    /// shared mutex, which its method bodies and the simulation hold.
    pub fn create_boiler(&self, name: &str) -> ModelResult<Arc<dyn UaObject>> {
        self.create(name, &self.boiler_type())
    }

    pub fn create_machine(&self, name: &str) -> ModelResult<Arc<dyn UaObject>> {
        self.create(name, &self.machine_type())
    }

    fn create(&self, name: &str, type_id: &NodeId) -> ModelResult<Arc<dyn UaObject>> {
        self.space.create_object(
            &self.folder,
            NodeId::new(self.namespace, name.to_string()),
            QualifiedName::new(self.namespace, name),
            type_id,
            Some(shared_mutex()),
        )
    }

    /// Add a WorkOrder variable as a component of `parent`. Pass the parent
    /// tree's mutex to have the work order share it.
    pub fn create_work_order(
        &self,
        parent: &NodeId,
        name: &str,
        shared_mutex: Option<SharedMutex>,
    ) -> ModelResult<Instance> {
        self.space.create_variable(
            parent,
            child_node_id(parent, name),
            QualifiedName::new(self.namespace, name.to_string()),
            &self.work_order_type(),
            ReferenceKind::HasComponent,
            shared_mutex,
        )
    }

    pub fn boilers(&self) -> Vec<Arc<DemoObject>> {
        self.factory.boiler_model().boilers()
    }

    /// Advance every live boiler by one simulation tick. A boiler that fails
    /// is logged and skipped; the number of boilers stepped is returned.
    pub fn simulate_step(&self, rate: f64) -> usize {
        let mut stepped = 0;
        for object in self.boilers() {
            let Some(boiler) = object.as_boiler() else {
                continue;
            };
            match boiler.simulate_step(rate) {
                Ok(()) => stepped += 1,
                Err(e) => warn!(boiler = %object.node_id(), error = %e, "Simulation step failed"),
            }
        }
        stepped
    }

    /// Remove every node of the namespace and tear its templates down.
    pub fn clear(&self) -> ModelResult<usize> {
        self.space.clear_namespace(self.namespace)
    }
}
