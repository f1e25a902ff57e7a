use crate::boiler::Boiler;
use async_trait::async_trait;
use opcua::types::{NodeId, StatusCode, Variant};
use ua_model_core::{
    method::{MethodOutcome, ServiceContext},
    BoundMethod, Instance, UaObject,
};

/// Runtime objects of the demo namespace, one variant per type with its own
/// behavior. Only boilers carry methods; the other variants fall through to
/// the generic handler.
pub enum DemoObject {
    Boiler(Boiler),
    Machine(Instance),
    Sensor(Instance),
}

impl DemoObject {
    pub fn as_boiler(&self) -> Option<&Boiler> {
        match self {
            DemoObject::Boiler(boiler) => Some(boiler),
            _ => None,
        }
    }
}

#[async_trait]
impl UaObject for DemoObject {
    fn instance(&self) -> &Instance {
        match self {
            DemoObject::Boiler(boiler) => boiler.instance(),
            DemoObject::Machine(instance) | DemoObject::Sensor(instance) => instance,
        }
    }

    fn resolve_method(&self, method_id: &NodeId) -> Option<BoundMethod> {
        match self {
            DemoObject::Boiler(boiler) => boiler.resolve_method(method_id),
            _ => None,
        }
    }

    async fn call_method(
        &self,
        _context: &ServiceContext,
        method: &BoundMethod,
        input_arguments: &[Variant],
    ) -> MethodOutcome {
        match self {
            DemoObject::Boiler(boiler) => boiler.call(method, input_arguments).await,
            _ => MethodOutcome::status(StatusCode::BadInvalidArgument),
        }
    }
}
