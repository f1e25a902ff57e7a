//! Instance builder.
//!
//! Two ways to produce an instance subtree for a type:
//!
//! - **fresh**: copy every Mandatory child of the type's template, deriving
//!   child ids as `{parent}.{BrowseName}`.
//! - **declared**: walk an external declaration tree in pre-order and bind
//!   each declared node to the first unclaimed child slot of the same browse
//!   name. Method slots are keyed by the template method's browse name, so
//!   they only exist once the type's template has been built.
//!
//! Children are added in declared order and each one is linked as soon as it
//! is built. All nodes go to the context's `NodeManagerConfig`; any failure
//! there is escalated to `ConfigurationFatal`.

use crate::{
    address_space::AddressSpace,
    declaration::{DeclId, DeclarationArena},
    instance::{BoundChild, BoundMethod, Instance, SharedMutex},
    layout::{ChildShape, TypeModel},
    node::{CachedValue, MethodArgument, ModellingRule, Node, NodeClass, ReferenceKind},
    node_id::child_node_id,
    node_manager::NodeManagerConfig,
    object::UaObject,
    registry::TemplateMethod,
};
use opcua::types::{NodeId, QualifiedName};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, trace};
use ua_model_error::{ModelError, ModelResult};

pub const INPUT_ARGUMENTS: &str = "InputArguments";
pub const OUTPUT_ARGUMENTS: &str = "OutputArguments";

/// State threaded through one construction.
pub struct BuildContext<'a> {
    space: &'a AddressSpace,
    config: &'a mut dyn NodeManagerConfig,
    shared_mutex: Option<SharedMutex>,
    objects: Vec<Arc<dyn UaObject>>,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        space: &'a AddressSpace,
        config: &'a mut dyn NodeManagerConfig,
        shared_mutex: Option<SharedMutex>,
    ) -> Self {
        Self {
            space,
            config,
            shared_mutex,
            objects: Vec::new(),
        }
    }

    #[inline]
    pub fn space(&self) -> &'a AddressSpace {
        self.space
    }

    #[inline]
    pub fn namespace_index(&self) -> u16 {
        self.config.namespace_index()
    }

    /// Register a node and link it under `parent`. A failure here means the
    /// information model is inconsistent and is always fatal.
    pub fn add_node_and_reference(
        &mut self,
        parent: &NodeId,
        node: Node,
        reference: ReferenceKind,
    ) -> ModelResult<()> {
        let node_id = node.node_id.clone();
        self.config
            .add_node_and_reference(parent, node, reference)
            .map_err(|e| e.into_fatal(format!("adding {node_id} under {parent}")))?;
        trace!(node_id = %node_id, parent = %parent, ?reference, "Node added");
        Ok(())
    }

    /// Remember a constructed object so it is registered with the address
    /// space once the construction is committed.
    pub fn track(&mut self, object: Arc<dyn UaObject>) {
        self.objects.push(object);
    }

    pub fn into_objects(self) -> Vec<Arc<dyn UaObject>> {
        self.objects
    }

    pub(crate) fn new_instance(
        &self,
        root: (NodeId, QualifiedName, NodeClass),
        type_id: NodeId,
        children: Vec<BoundChild>,
        methods: Vec<BoundMethod>,
    ) -> Instance {
        let (node_id, browse_name, node_class) = root;
        Instance::new(
            node_id,
            browse_name,
            type_id,
            node_class,
            children,
            methods,
            Arc::clone(self.space.graph()),
            self.shared_mutex.clone(),
        )
    }
}

/// Add the `InputArguments`/`OutputArguments` properties of a method. Empty
/// argument lists produce no property. Ids default to `{method}.InputArguments`.
pub(crate) fn add_argument_properties(
    cx: &mut BuildContext<'_>,
    method_id: &NodeId,
    input: (Option<NodeId>, &Arc<[MethodArgument]>),
    output: (Option<NodeId>, &Arc<[MethodArgument]>),
    modelling_rule: Option<ModellingRule>,
) -> ModelResult<()> {
    for (name, (node_id, arguments)) in [(INPUT_ARGUMENTS, input), (OUTPUT_ARGUMENTS, output)] {
        if arguments.is_empty() {
            continue;
        }
        let node_id = node_id.unwrap_or_else(|| child_node_id(method_id, name));
        let node = Node::arguments_property(node_id, QualifiedName::new(0, name), Arc::clone(arguments))
            .with_modelling_rule(modelling_rule);
        cx.add_node_and_reference(method_id, node, ReferenceKind::HasProperty)?;
    }
    Ok(())
}

fn bind_method(
    cx: &mut BuildContext<'_>,
    node_id: NodeId,
    browse_name: QualifiedName,
    template_node_id: NodeId,
    signature: &TemplateMethod,
) -> ModelResult<BoundMethod> {
    add_argument_properties(
        cx,
        &node_id,
        (None, &signature.input),
        (None, &signature.output),
        None,
    )?;
    Ok(BoundMethod {
        browse_name,
        node_id,
        template_node_id: Some(template_node_id),
        input: Arc::clone(&signature.input),
        output: Arc::clone(&signature.output),
    })
}

/// Fresh-from-template instantiation. `root` is the already prepared root
/// node; it is linked under `parent` before any child is built.
pub fn instantiate_fresh(
    cx: &mut BuildContext<'_>,
    model: &dyn TypeModel,
    root: Node,
    parent: &NodeId,
    reference: ReferenceKind,
) -> ModelResult<Instance> {
    let layout = model.layout();
    let space = cx.space();
    let template = space.registry().require_template(space, &layout.type_id)?;

    let root_key = (root.node_id.clone(), root.browse_name.clone(), root.node_class());
    let root_id = root_key.0.clone();
    cx.add_node_and_reference(parent, root, reference)?;

    let mut children = Vec::new();
    let mut methods = Vec::new();
    for child in template.mandatory() {
        let node_id = child_node_id(&root_id, child.browse_name.name.as_ref());
        match child.node_class {
            NodeClass::Variable => {
                copy_declaration_node(cx, &child.node_id, node_id.clone(), &root_id, child.reference)?;
            }
            NodeClass::Object => {
                space.factory().instantiate_object(
                    cx,
                    &child.node_id,
                    node_id.clone(),
                    &root_id,
                    child.reference,
                )?;
            }
            NodeClass::Method => {
                let signature = child.method.as_ref().ok_or_else(|| {
                    ModelError::ConfigurationFatal(format!(
                        "template method {} has no signature",
                        child.browse_name.name
                    ))
                })?;
                let method = Node::method(node_id.clone(), child.browse_name.clone());
                cx.add_node_and_reference(&root_id, method, child.reference)?;
                methods.push(bind_method(
                    cx,
                    node_id,
                    child.browse_name.clone(),
                    child.node_id.clone(),
                    signature,
                )?);
                continue;
            }
            other => {
                return Err(ModelError::ConfigurationFatal(format!(
                    "{other:?} {} cannot be instantiated from a template",
                    child.browse_name.name
                )))
            }
        }
        children.push(BoundChild {
            browse_name: child.browse_name.clone(),
            node_id,
            node_class: child.node_class,
            reference: child.reference,
        });
    }

    debug!(
        node_id = %root_id,
        type_id = %layout.type_id,
        children = children.len(),
        methods = methods.len(),
        "Instance built from template"
    );
    Ok(cx.new_instance(root_key, layout.type_id.clone(), children, methods))
}

/// Copy an instance-declaration node from the graph under a new id, along
/// with its Mandatory children. Object children go back through the factory
/// so typed objects get their own constructor.
pub(crate) fn copy_declaration_node(
    cx: &mut BuildContext<'_>,
    source: &NodeId,
    node_id: NodeId,
    parent: &NodeId,
    reference: ReferenceKind,
) -> ModelResult<Vec<BoundChild>> {
    let space = cx.space();
    let (mut node, mandatory) = {
        let graph = space.graph().read();
        let node = graph
            .node(source)
            .cloned()
            .ok_or_else(|| ModelError::ConfigurationFatal(format!("declaration {source} is gone")))?;
        let mandatory: Vec<(ReferenceKind, NodeId, QualifiedName, NodeClass)> = graph
            .children(source)
            .into_iter()
            .filter_map(|(r, id)| {
                graph
                    .node(&id)
                    .filter(|n| n.modelling_rule == Some(ModellingRule::Mandatory))
                    .map(|n| (r, id.clone(), n.browse_name.clone(), n.node_class()))
            })
            .collect();
        (node, mandatory)
    };

    node.node_id = node_id.clone();
    node.modelling_rule = None;
    if let Some(body) = node.as_variable_mut() {
        body.value = CachedValue::new(body.value.value.clone());
    }
    cx.add_node_and_reference(parent, node, reference)?;

    let mut bound = Vec::with_capacity(mandatory.len());
    for (reference, child_source, browse_name, node_class) in mandatory {
        let child_id = child_node_id(&node_id, browse_name.name.as_ref());
        if node_class == NodeClass::Object {
            space
                .factory()
                .instantiate_object(cx, &child_source, child_id.clone(), &node_id, reference)?;
        } else {
            copy_declaration_node(cx, &child_source, child_id.clone(), &node_id, reference)?;
        }
        bound.push(BoundChild {
            browse_name,
            node_id: child_id,
            node_class,
            reference,
        });
    }
    Ok(bound)
}

struct Slot {
    browse_name: QualifiedName,
    node_class: NodeClass,
    reference: ReferenceKind,
    method: Option<(NodeId, TemplateMethod)>,
    claimed: Option<NodeId>,
}

fn slot_key(name: &QualifiedName) -> (u16, String) {
    (name.namespace_index, name.name.as_ref().to_string())
}

/// Declaration-matched instantiation of the declaration `decl`.
pub fn instantiate_declared(
    cx: &mut BuildContext<'_>,
    model: &dyn TypeModel,
    arena: &DeclarationArena,
    decl: DeclId,
    parent: &NodeId,
    reference: ReferenceKind,
) -> ModelResult<Instance> {
    let layout = model.layout();
    let space = cx.space();
    let template = space.registry().ensure_type_created(space, &layout.type_id)?;
    let declaration = &arena[decl];

    let root = space
        .factory()
        .root_from_declaration(declaration, layout)?;
    let root_key = (root.node_id.clone(), root.browse_name.clone(), root.node_class());
    let root_id = root_key.0.clone();
    cx.add_node_and_reference(parent, root, reference)?;

    let mut slots: Vec<Slot> = Vec::with_capacity(layout.children.len());
    for child in &layout.children {
        match &child.shape {
            ChildShape::Declared(tree) => slots.push(Slot {
                browse_name: tree.declaration.browse_name.clone(),
                node_class: tree.declaration.node_class,
                reference: child.reference,
                method: None,
                claimed: None,
            }),
            ChildShape::Method(method) => {
                let known = template.as_ref().and_then(|t| {
                    t.methods()
                        .find(|m| m.node_id == method.node_id)
                        .and_then(|m| m.method.clone().map(|s| (m, s)))
                });
                if let Some((template_method, signature)) = known {
                    slots.push(Slot {
                        browse_name: template_method.browse_name.clone(),
                        node_class: NodeClass::Method,
                        reference: child.reference,
                        method: Some((template_method.node_id.clone(), signature)),
                        claimed: None,
                    });
                }
            }
        }
    }
    let by_name: HashMap<(u16, String), usize> = slots
        .iter()
        .enumerate()
        .map(|(i, s)| (slot_key(&s.browse_name), i))
        .collect();

    let factory = space.factory();
    let mut methods = Vec::new();
    for id in arena.hierarchically_referenced_nodes(decl) {
        let child = &arena[id];
        let Some(&index) = by_name.get(&slot_key(&child.browse_name)) else {
            continue;
        };
        let slot = &mut slots[index];
        if slot.claimed.is_some() {
            debug!(
                instance = %root_id,
                browse_name = %child.browse_name.name,
                ignored = %child.node_id,
                "Child slot already claimed"
            );
            continue;
        }
        if child.node_class != slot.node_class {
            return Err(ModelError::ConfigurationFatal(format!(
                "declared {} is a {:?}, {} expects a {:?}",
                child.browse_name.name, child.node_class, layout.browse_name.name, slot.node_class
            )));
        }
        let node_id = match slot.node_class {
            NodeClass::Object => factory
                .create_object(cx, arena, id, &root_id, slot.reference)?
                .node_id()
                .clone(),
            NodeClass::Variable => factory.create_variable(cx, arena, id, &root_id, slot.reference)?,
            _ => {
                let node_id = factory.create_method(cx, arena, id, &root_id, slot.reference)?;
                if let Some((template_id, signature)) = &slot.method {
                    methods.push(bind_method(
                        cx,
                        node_id.clone(),
                        slot.browse_name.clone(),
                        template_id.clone(),
                        signature,
                    )?);
                }
                node_id
            }
        };
        slot.claimed = Some(node_id);
    }

    for child in layout
        .children
        .iter()
        .filter(|c| c.modelling_rule == ModellingRule::Mandatory)
    {
        let bound = slots
            .iter()
            .any(|s| &s.browse_name == child.browse_name() && s.claimed.is_some());
        if !bound {
            return Err(ModelError::ConfigurationFatal(format!(
                "{} {} is missing mandatory child {}",
                layout.browse_name.name,
                root_id,
                child.browse_name().name
            )));
        }
    }

    let children: Vec<BoundChild> = slots
        .into_iter()
        .filter(|s| s.node_class != NodeClass::Method)
        .filter_map(|s| {
            s.claimed.map(|node_id| BoundChild {
                browse_name: s.browse_name,
                node_id,
                node_class: s.node_class,
                reference: s.reference,
            })
        })
        .collect();

    debug!(
        node_id = %root_id,
        type_id = %layout.type_id,
        children = children.len(),
        methods = methods.len(),
        "Instance built from declaration"
    );
    Ok(cx.new_instance(root_key, layout.type_id.clone(), children, methods))
}
