#![allow(dead_code)]

use opcua::types::{NodeId, QualifiedName};
use std::sync::{Arc, Once};
use tracing::Level;
use ua_model_core::{builtin, AddressSpace, UaObject};
use ua_model_demo::BoilerDemo;

pub const NAMESPACE_URI: &str = "urn:ua-model:demo:test";

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .without_time()
            .try_init();
    });
}

/// A fresh address space with the demo namespace registered.
pub fn demo_space() -> (Arc<AddressSpace>, BoilerDemo) {
    init_tracing();
    let space = Arc::new(AddressSpace::new().expect("address space"));
    let demo = BoilerDemo::register(Arc::clone(&space), NAMESPACE_URI).expect("demo namespace");
    (space, demo)
}

pub fn boiler(demo: &BoilerDemo, name: &str) -> Arc<dyn UaObject> {
    demo.create_boiler(name).expect("boiler")
}

pub fn node(ns: u16, id: &str) -> NodeId {
    NodeId::new(ns, id.to_string())
}

pub fn name(ns: u16, name: &str) -> QualifiedName {
    QualifiedName::new(ns, name)
}

pub fn objects() -> NodeId {
    builtin::objects_folder()
}
