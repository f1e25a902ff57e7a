pub mod address_space;
pub mod builder;
pub mod builtin;
pub mod declaration;
pub mod factory;
pub mod graph;
pub mod instance;
pub mod layout;
pub mod method;
pub mod namespace;
pub mod node;
pub mod node_id;
pub mod node_manager;
pub mod object;
pub mod registry;
mod template;

#[cfg(test)]
pub(crate) mod testing;

pub use address_space::AddressSpace;
pub use declaration::{DeclId, Declaration, DeclarationArena, DeclarationTree};
pub use factory::{InstanceFactory, NamespaceFactory};
pub use graph::{NodeGraph, SharedGraph};
pub use instance::{shared_mutex, BoundChild, BoundMethod, Instance, SharedMutex};
pub use layout::{ChildLayout, MethodLayout, TypeKind, TypeLayout, TypeModel};
pub use node::{MethodArgument, ModellingRule, Node, NodeClass, ReferenceKind};
pub use object::{GenericObject, UaObject};
pub use registry::{TypeRegistry, TypeTemplate};
