//! Type registry.
//!
//! Holds the canonical template of every type that has been used. A template
//! is built once on first use and then shared read-only by every instance of
//! the type. The registry is owned by the `AddressSpace`; its lifecycle is
//! explicit:
//!
//! - `ensure_type_created` builds the template if the type's created flag is
//!   not set. The flag is set before children are built, so a re-entrant
//!   request for the same type returns without a template instead of
//!   recursing.
//! - `teardown` resets the flag, removes the template nodes and releases the
//!   model's static members. It is also registered as a callback on the
//!   type's namespace and runs when that namespace is cleared. A type holds at
//!   most one pending hook however often it is torn down and rebuilt.
//!
//! First use of a type is not safe under concurrent callers. Address-space
//! bring-up must serialize it.

use crate::{
    address_space::AddressSpace,
    graph::SharedGraph,
    layout::TypeModel,
    node::{MethodArgument, ModellingRule, NodeClass, ReferenceKind},
    template,
};
use dashmap::{mapref::entry::Entry, DashMap, DashSet};
use opcua::types::{NodeId, QualifiedName};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use ua_model_error::{ModelError, ModelResult};

/// Signature carried by a template method.
#[derive(Debug, Clone)]
pub struct TemplateMethod {
    pub input: Arc<[MethodArgument]>,
    pub output: Arc<[MethodArgument]>,
}

#[derive(Debug, Clone)]
pub struct TemplateChild {
    pub node_id: NodeId,
    pub browse_name: QualifiedName,
    pub node_class: NodeClass,
    pub reference: ReferenceKind,
    pub modelling_rule: ModellingRule,
    pub type_definition: Option<NodeId>,
    pub method: Option<TemplateMethod>,
}

/// The built template of a type: its type node and its direct children in
/// declared order.
#[derive(Debug, Clone)]
pub struct TypeTemplate {
    pub type_id: NodeId,
    pub browse_name: QualifiedName,
    pub children: Vec<TemplateChild>,
}

impl TypeTemplate {
    pub fn child(&self, name: &str) -> Option<&TemplateChild> {
        self.children
            .iter()
            .find(|c| c.browse_name.name.as_ref() == name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &TemplateChild> {
        self.children
            .iter()
            .filter(|c| c.node_class == NodeClass::Method)
    }

    pub fn mandatory(&self) -> impl Iterator<Item = &TemplateChild> {
        self.children
            .iter()
            .filter(|c| c.modelling_rule == ModellingRule::Mandatory)
    }
}

#[derive(Clone)]
enum TypeState {
    Building,
    Created {
        template: Arc<TypeTemplate>,
        model: Arc<dyn TypeModel>,
    },
}

pub struct TypeRegistry {
    graph: SharedGraph,
    states: DashMap<NodeId, TypeState>,
    hooked: DashSet<NodeId>,
}

impl TypeRegistry {
    pub fn new(graph: SharedGraph) -> Self {
        Self {
            graph,
            states: DashMap::new(),
            hooked: DashSet::new(),
        }
    }

    /// The type's created flag. Also true while its template is being built.
    pub fn is_created(&self, type_id: &NodeId) -> bool {
        self.states.contains_key(type_id)
    }

    pub fn template(&self, type_id: &NodeId) -> Option<Arc<TypeTemplate>> {
        match self.states.get(type_id).map(|s| s.value().clone()) {
            Some(TypeState::Created { template, .. }) => Some(template),
            _ => None,
        }
    }

    pub fn created_types(&self) -> Vec<NodeId> {
        self.states
            .iter()
            .filter(|s| matches!(s.value(), TypeState::Created { .. }))
            .map(|s| s.key().clone())
            .collect()
    }

    /// Build the template of `type_id` unless its created flag is already set.
    ///
    /// Returns `None` only for a re-entrant call made while the type's own
    /// template is still being built.
    pub fn ensure_type_created(
        self: &Arc<Self>,
        space: &AddressSpace,
        type_id: &NodeId,
    ) -> ModelResult<Option<Arc<TypeTemplate>>> {
        match self.states.entry(type_id.clone()) {
            Entry::Occupied(entry) => {
                return match entry.get() {
                    TypeState::Created { template, .. } => Ok(Some(Arc::clone(template))),
                    TypeState::Building => {
                        debug!(type_id = %type_id, "Template build already in progress");
                        Ok(None)
                    }
                };
            }
            Entry::Vacant(entry) => {
                entry.insert(TypeState::Building);
            }
        }

        let built = space
            .factory()
            .type_model(type_id)
            .ok_or_else(|| ModelError::UnresolvedType {
                namespace: type_id.namespace,
                type_definition: type_id.to_string(),
            })
            .and_then(|model| template::build_template(space, model.as_ref()).map(|t| (t, model)));

        let (template, model) = match built {
            Ok(built) => built,
            Err(e) => {
                self.states.remove(type_id);
                return Err(e.into_fatal(format!("building template of {type_id}")));
            }
        };

        let template = Arc::new(template);
        self.states.insert(
            type_id.clone(),
            TypeState::Created {
                template: Arc::clone(&template),
                model,
            },
        );

        if self.hooked.insert(type_id.clone()) {
            let registry: Weak<Self> = Arc::downgrade(self);
            let hook_type = type_id.clone();
            let hooked = space.namespaces().on_clear(
                type_id.namespace,
                Box::new(move || {
                    if let Some(registry) = registry.upgrade() {
                        registry.hooked.remove(&hook_type);
                        registry.teardown(&hook_type);
                    }
                }),
            );
            if let Err(e) = hooked {
                self.hooked.remove(type_id);
                return Err(e);
            }
        }

        info!(
            type_id = %type_id,
            browse_name = %template.browse_name.name,
            children = template.children.len(),
            "Type template created"
        );
        Ok(Some(template))
    }

    /// Like `ensure_type_created`, but a missing template is a fatal error.
    pub fn require_template(
        self: &Arc<Self>,
        space: &AddressSpace,
        type_id: &NodeId,
    ) -> ModelResult<Arc<TypeTemplate>> {
        self.ensure_type_created(space, type_id)?.ok_or_else(|| {
            ModelError::ConfigurationFatal(format!(
                "template of {type_id} is required while it is still being built"
            ))
        })
    }

    /// Reset the type's created flag and drop its template nodes. Returns
    /// whether there was a template to tear down; repeated calls are no-ops.
    pub fn teardown(&self, type_id: &NodeId) -> bool {
        match self.states.remove(type_id) {
            Some((_, TypeState::Created { template, model })) => {
                let removed = self.graph.write().remove_subtree(&template.type_id);
                model.clear_static_members();
                info!(type_id = %type_id, removed, "Type template torn down");
                true
            }
            Some((_, TypeState::Building)) => {
                warn!(type_id = %type_id, "Teardown requested during template build");
                true
            }
            None => false,
        }
    }

    /// Tear down every created type.
    pub fn teardown_all(&self) -> usize {
        let types: Vec<NodeId> = self.states.iter().map(|s| s.key().clone()).collect();
        types.iter().filter(|t| self.teardown(t)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builtin, testing::tank_space_with_factory};
    use std::sync::atomic::Ordering;

    fn child_names(template: &TypeTemplate) -> Vec<(String, ModellingRule, NodeClass)> {
        template
            .children
            .iter()
            .map(|c| (c.browse_name.name.to_string(), c.modelling_rule, c.node_class))
            .collect()
    }

    #[test]
    fn test_template_built_once() {
        let (space, ns, _) = tank_space_with_factory();
        let type_id = NodeId::new(ns, 1u32);

        let first = space.ensure_type_created(&type_id).unwrap().unwrap();
        let nodes = space.node_count();
        let second = space.ensure_type_created(&type_id).unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(space.node_count(), nodes);
        assert_eq!(
            child_names(&first),
            vec![
                ("Level".to_string(), ModellingRule::Mandatory, NodeClass::Variable),
                ("Capacity".to_string(), ModellingRule::Optional, NodeClass::Variable),
                ("Drain".to_string(), ModellingRule::Mandatory, NodeClass::Method),
            ]
        );

        let graph = space.graph().read();
        assert_eq!(
            graph.parent(&type_id),
            Some((ReferenceKind::HasSubtype, builtin::base_object_type()))
        );
        assert_eq!(
            graph.browse_path(&type_id, &["Drain", "InputArguments"]),
            Some(NodeId::new(ns, 6003u32))
        );
        assert_eq!(
            graph.node(&NodeId::new(ns, 6001u32)).and_then(|n| n.modelling_rule),
            Some(ModellingRule::Mandatory)
        );
    }

    #[test]
    fn test_teardown_and_rebuild() {
        let (space, ns, factory) = tank_space_with_factory();
        let type_id = NodeId::new(ns, 1u32);
        let before = space.node_count();

        let original = space.ensure_type_created(&type_id).unwrap().unwrap();
        assert!(space.teardown_type(&type_id));
        assert!(!space.teardown_type(&type_id));
        assert_eq!(factory.tank.cleared.load(Ordering::SeqCst), 1);
        assert_eq!(space.node_count(), before);
        assert!(!space.registry().is_created(&type_id));

        let rebuilt = space.ensure_type_created(&type_id).unwrap().unwrap();
        assert_eq!(child_names(&original), child_names(&rebuilt));
        assert_eq!(space.registry().created_types(), vec![type_id]);
    }

    #[test]
    fn test_rebuild_keeps_one_teardown_hook() {
        let (space, ns, factory) = tank_space_with_factory();
        let type_id = NodeId::new(ns, 1u32);

        for _ in 0..3 {
            space.ensure_type_created(&type_id).unwrap().unwrap();
            assert!(space.teardown_type(&type_id));
        }
        space.ensure_type_created(&type_id).unwrap().unwrap();

        let hooks = space.namespaces().take_teardown_hooks(ns);
        assert_eq!(hooks.len(), 1);
        for hook in hooks {
            hook();
        }
        assert!(!space.registry().is_created(&type_id));
        assert_eq!(factory.tank.cleared.load(Ordering::SeqCst), 4);

        // The hook is re-armed by the next build.
        space.ensure_type_created(&type_id).unwrap().unwrap();
        assert_eq!(space.namespaces().take_teardown_hooks(ns).len(), 1);
    }

    #[test]
    fn test_self_referencing_type_terminates() {
        let (space, ns, _) = tank_space_with_factory();
        let type_id = NodeId::new(ns, 2u32);

        let template = space.ensure_type_created(&type_id).unwrap().unwrap();
        assert_eq!(template.children.len(), 2);
        let graph = space.graph().read();
        assert_eq!(
            graph.browse_path(&type_id, &["Next"]),
            Some(NodeId::new(ns, 5010u32))
        );
        // The nested `Next` was built while the type was still in progress,
        // so its declared `Ping` had no method slot to bind to.
        assert!(graph.children(&NodeId::new(ns, 5010u32)).is_empty());
        assert!(!graph.contains(&NodeId::new(ns, 5011u32)));
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let (space, ns, _) = tank_space_with_factory();
        let err = space
            .ensure_type_created(&NodeId::new(ns, 99u32))
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(!space.registry().is_created(&NodeId::new(ns, 99u32)));
    }
}
