use crate::{
    instance::{BoundMethod, Instance},
    method::{MethodOutcome, ServiceContext},
};
use async_trait::async_trait;
use opcua::types::{NodeId, StatusCode, Variant};

/// Runtime object behind an Object node.
///
/// Concrete types answer for the methods they implement. Anything they do
/// not recognize falls through to the default implementations here, which
/// act as the generic BaseObjectType handler and reject the call with
/// `BadInvalidArgument`.
#[async_trait]
pub trait UaObject: Send + Sync + 'static {
    fn instance(&self) -> &Instance;

    #[inline]
    fn node_id(&self) -> &NodeId {
        self.instance().node_id()
    }

    /// Resolve `method_id` against the methods this object implements.
    fn resolve_method(&self, _method_id: &NodeId) -> Option<BoundMethod> {
        None
    }

    /// Run a resolved method with arguments already coerced to its signature.
    async fn call_method(
        &self,
        _context: &ServiceContext,
        _method: &BoundMethod,
        _input_arguments: &[Variant],
    ) -> MethodOutcome {
        MethodOutcome::status(StatusCode::BadInvalidArgument)
    }
}

/// An object without type-specific behavior.
pub struct GenericObject {
    instance: Instance,
}

impl GenericObject {
    pub fn new(instance: Instance) -> Self {
        Self { instance }
    }
}

impl UaObject for GenericObject {
    fn instance(&self) -> &Instance {
        &self.instance
    }
}
