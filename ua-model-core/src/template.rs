use crate::{
    address_space::AddressSpace,
    builder::{add_argument_properties, BuildContext},
    declaration::DeclarationArena,
    layout::{ChildLayout, ChildShape, TypeKind, TypeLayout, TypeModel},
    node::{ModellingRule, Node, NodeClass, ReferenceKind},
    node_manager::StagedTree,
    registry::{TemplateChild, TemplateMethod, TypeTemplate},
};
use tracing::debug;
use ua_model_error::{ModelError, ModelResult};

/// Build the type node and its template children, then commit them to the
/// graph in one step.
pub(crate) fn build_template(
    space: &AddressSpace,
    model: &dyn TypeModel,
) -> ModelResult<TypeTemplate> {
    let layout = model.layout();
    let mut staged = StagedTree::new(layout.type_id.namespace);
    let mut children = Vec::with_capacity(layout.children.len());

    let objects = {
        let mut cx = BuildContext::new(space, &mut staged, None);
        cx.add_node_and_reference(
            &layout.super_type,
            type_node(layout),
            ReferenceKind::HasSubtype,
        )?;
        for child in &layout.children {
            children.push(build_child(&mut cx, layout, child)?);
        }
        cx.into_objects()
    };

    verify(layout, &staged)?;
    debug!(
        type_id = %layout.type_id,
        nodes = staged.len(),
        "Committing type template"
    );
    space.commit(staged, objects)?;

    Ok(TypeTemplate {
        type_id: layout.type_id.clone(),
        browse_name: layout.browse_name.clone(),
        children,
    })
}

fn type_node(layout: &TypeLayout) -> Node {
    match &layout.kind {
        TypeKind::Object => Node::object_type(
            layout.type_id.clone(),
            layout.browse_name.clone(),
            layout.is_abstract,
        ),
        TypeKind::Variable {
            data_type,
            value_rank,
            ..
        } => Node::variable_type(
            layout.type_id.clone(),
            layout.browse_name.clone(),
            data_type.clone(),
            *value_rank,
            layout.is_abstract,
        ),
    }
}

fn build_child(
    cx: &mut BuildContext<'_>,
    layout: &TypeLayout,
    child: &ChildLayout,
) -> ModelResult<TemplateChild> {
    match &child.shape {
        ChildShape::Declared(tree) => {
            // The layout's rule wins over whatever the declaration carries.
            let mut tree = tree.clone();
            tree.declaration.modelling_rule = child.modelling_rule.node_id();
            let (arena, root) = DeclarationArena::from_tree(&tree);
            let declaration = &arena[root];
            let factory = cx.space().factory();
            let node_id = match declaration.node_class {
                NodeClass::Object => factory
                    .create_object(cx, &arena, root, &layout.type_id, child.reference)?
                    .node_id()
                    .clone(),
                NodeClass::Variable => {
                    factory.create_variable(cx, &arena, root, &layout.type_id, child.reference)?
                }
                other => {
                    return Err(ModelError::ConfigurationFatal(format!(
                        "{other:?} {} cannot be a declared template child of {}",
                        declaration.browse_name.name, layout.type_id
                    )))
                }
            };
            Ok(TemplateChild {
                node_id,
                browse_name: declaration.browse_name.clone(),
                node_class: declaration.node_class,
                reference: child.reference,
                modelling_rule: child.modelling_rule,
                type_definition: declaration.type_definition.clone(),
                method: None,
            })
        }
        ChildShape::Method(method) => {
            let node = Node::method(method.node_id.clone(), method.browse_name.clone())
                .with_modelling_rule(Some(child.modelling_rule));
            cx.add_node_and_reference(&layout.type_id, node, child.reference)?;
            add_argument_properties(
                cx,
                &method.node_id,
                (method.input_arguments_id.clone(), &method.input),
                (method.output_arguments_id.clone(), &method.output),
                Some(ModellingRule::Mandatory),
            )?;
            Ok(TemplateChild {
                node_id: method.node_id.clone(),
                browse_name: method.browse_name.clone(),
                node_class: NodeClass::Method,
                reference: child.reference,
                modelling_rule: child.modelling_rule,
                type_definition: None,
                method: Some(TemplateMethod {
                    input: method.input.clone(),
                    output: method.output.clone(),
                }),
            })
        }
    }
}

/// Every template child, and every Mandatory node at any depth of its
/// declaration, must have been staged.
fn verify(layout: &TypeLayout, staged: &StagedTree) -> ModelResult<()> {
    for child in &layout.children {
        if !staged.contains(child.node_id()) {
            return Err(missing(layout, &child.browse_name().name.to_string()));
        }
        if let ChildShape::Declared(tree) = &child.shape {
            for declaration in tree.walk().into_iter().skip(1) {
                if declaration.declared_modelling_rule() == Some(ModellingRule::Mandatory)
                    && !staged.contains(&declaration.node_id)
                {
                    return Err(missing(layout, &declaration.browse_name.name.to_string()));
                }
            }
        }
    }
    Ok(())
}

fn missing(layout: &TypeLayout, name: &str) -> ModelError {
    ModelError::ConfigurationFatal(format!(
        "template of {} is missing mandatory child {name}",
        layout.browse_name.name
    ))
}
