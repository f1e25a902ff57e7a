//! Fixtures shared by the unit tests of this crate.

use crate::{
    address_space::AddressSpace,
    builtin,
    declaration::{Declaration, DeclarationTree},
    factory::NamespaceFactory,
    instance::{BoundMethod, Instance},
    layout::{ChildLayout, MethodLayout, TypeLayout, TypeModel},
    method::{CallResult, MethodManagerCallback, MethodOutcome, ServiceContext},
    node::{MethodArgument, ModellingRule, ACCESS_READ_WRITE},
    object::UaObject,
};
use async_trait::async_trait;
use opcua::types::{DataTypeId, NodeId, QualifiedName, StatusCode, Variant};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use tokio::sync::Notify;
use uuid::Uuid;

pub const TEST_NAMESPACE: &str = "urn:ua-model:test";

/// TankType (i=1): Level (Mandatory), Capacity (Optional), Drain(Amount).
pub struct TankModel {
    layout: TypeLayout,
    pub cleared: AtomicUsize,
}

impl TankModel {
    pub fn new(ns: u16) -> Self {
        let level = Declaration::variable(
            NodeId::new(ns, 6001u32),
            QualifiedName::new(ns, "Level"),
            DataTypeId::Double.into(),
            builtin::base_data_variable_type(),
        )
        .with_access_level(ACCESS_READ_WRITE);
        let capacity = Declaration::variable(
            NodeId::new(ns, 6002u32),
            QualifiedName::new(ns, "Capacity"),
            DataTypeId::Double.into(),
            builtin::property_type(),
        )
        .with_value(100.0);
        let drain = MethodLayout::new(NodeId::new(ns, 7001u32), QualifiedName::new(ns, "Drain"))
            .with_input(
                NodeId::new(ns, 6003u32),
                vec![MethodArgument::scalar("Amount", DataTypeId::Double, "Amount [l]")],
            )
            .with_output(
                NodeId::new(ns, 6004u32),
                vec![MethodArgument::scalar("Remaining", DataTypeId::Double, "Level [l]")],
            );
        let layout = TypeLayout::object(NodeId::new(ns, 1u32), QualifiedName::new(ns, "TankType"))
            .with_child(ChildLayout::component(
                ModellingRule::Mandatory,
                DeclarationTree::new(level),
            ))
            .with_child(ChildLayout::property(
                ModellingRule::Optional,
                DeclarationTree::new(capacity),
            ))
            .with_child(ChildLayout::method(ModellingRule::Mandatory, drain));
        Self {
            layout,
            cleared: AtomicUsize::new(0),
        }
    }
}

impl TypeModel for TankModel {
    fn layout(&self) -> &TypeLayout {
        &self.layout
    }

    fn wrap(&self, instance: Instance) -> Arc<dyn UaObject> {
        Arc::new(Tank { instance })
    }

    fn clear_static_members(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Tank {
    instance: Instance,
}

#[async_trait]
impl UaObject for Tank {
    fn instance(&self) -> &Instance {
        &self.instance
    }

    fn resolve_method(&self, method_id: &NodeId) -> Option<BoundMethod> {
        self.instance.method_by_id(method_id).cloned()
    }

    async fn call_method(
        &self,
        _context: &ServiceContext,
        method: &BoundMethod,
        input_arguments: &[Variant],
    ) -> MethodOutcome {
        let Some(Variant::Double(amount)) = input_arguments.first() else {
            return MethodOutcome::status(StatusCode::BadInvalidArgument);
        };
        if method.name() != "Drain" || *amount < 0.0 {
            return MethodOutcome::status(StatusCode::BadOutOfRange);
        }
        let guard = self.instance.lock();
        let level = match guard.read(&["Level"]) {
            Ok(Variant::Double(level)) => level,
            _ => 0.0,
        };
        let remaining = (level - amount).max(0.0);
        match guard.write(&["Level"], Variant::Double(remaining)) {
            Ok(()) => MethodOutcome::good(vec![Variant::Double(remaining)]),
            Err(_) => MethodOutcome::status(StatusCode::BadInternalError),
        }
    }
}

/// LinkType (i=2): an Optional `Next` child of its own type and an Optional
/// `Ping` method. The `Next` declaration declares `Ping` as well.
pub struct LinkModel {
    layout: TypeLayout,
}

impl LinkModel {
    pub fn new(ns: u16) -> Self {
        let type_id = NodeId::new(ns, 2u32);
        let next = DeclarationTree::new(Declaration::object(
            NodeId::new(ns, 5010u32),
            QualifiedName::new(ns, "Next"),
            type_id.clone(),
        ))
        .component(DeclarationTree::new(Declaration::method(
            NodeId::new(ns, 5011u32),
            QualifiedName::new(ns, "Ping"),
        )));
        let ping = MethodLayout::new(NodeId::new(ns, 7010u32), QualifiedName::new(ns, "Ping"));
        Self {
            layout: TypeLayout::object(type_id, QualifiedName::new(ns, "LinkType"))
                .with_child(ChildLayout::component(ModellingRule::Optional, next))
                .with_child(ChildLayout::method(ModellingRule::Optional, ping)),
        }
    }
}

impl TypeModel for LinkModel {
    fn layout(&self) -> &TypeLayout {
        &self.layout
    }
}

pub struct TestFactory {
    ns: u16,
    pub tank: Arc<TankModel>,
    link: Arc<LinkModel>,
}

impl NamespaceFactory for TestFactory {
    fn namespace_index(&self) -> u16 {
        self.ns
    }

    fn type_model(&self, type_id: &NodeId) -> Option<Arc<dyn TypeModel>> {
        if *type_id == self.tank.layout.type_id {
            Some(self.tank.clone())
        } else if *type_id == self.link.layout.type_id {
            Some(self.link.clone())
        } else {
            None
        }
    }
}

/// An address space with the test namespace and its factory registered.
pub fn tank_space() -> (AddressSpace, u16) {
    let (space, ns, _) = tank_space_with_factory();
    (space, ns)
}

pub fn tank_space_with_factory() -> (AddressSpace, u16, Arc<TestFactory>) {
    let space = AddressSpace::new().unwrap();
    let ns = space.register_namespace(TEST_NAMESPACE).unwrap();
    let factory = Arc::new(TestFactory {
        ns,
        tank: Arc::new(TankModel::new(ns)),
        link: Arc::new(LinkModel::new(ns)),
    });
    space.register_factory(factory.clone()).unwrap();
    (space, ns, factory)
}

/// Callback that records every completion.
#[derive(Default)]
pub struct Recorder {
    results: Mutex<Vec<(Uuid, CallResult)>>,
    notify: Notify,
}

impl Recorder {
    pub fn count(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    pub async fn wait_one(&self) -> (Uuid, CallResult) {
        loop {
            if let Some(first) = self.results.lock().unwrap().first().cloned() {
                return first;
            }
            self.notify.notified().await;
        }
    }
}

impl MethodManagerCallback for Recorder {
    fn on_call_complete(&self, job_id: Uuid, _context: &ServiceContext, result: CallResult) {
        self.results.lock().unwrap().push((job_id, result));
        self.notify.notify_one();
    }
}
