//! WorkOrderVariableType: a VariableType whose instances carry the asset,
//! id and start time of a work order as properties.

use crate::identifiers::{self as ids, id};
use opcua::types::{DataTypeId, QualifiedName};
use ua_model_core::{
    builtin, ChildLayout, Declaration, DeclarationTree, ModellingRule, TypeLayout, TypeModel,
};

pub struct WorkOrderModel {
    layout: TypeLayout,
}

impl WorkOrderModel {
    pub fn new(namespace: u16) -> Self {
        let property = |node_id: u32, name: &str, data_type: DataTypeId| {
            ChildLayout::property(
                ModellingRule::Mandatory,
                DeclarationTree::new(Declaration::variable(
                    id(namespace, node_id),
                    QualifiedName::new(namespace, name),
                    data_type.into(),
                    builtin::property_type(),
                )),
            )
        };
        let layout = TypeLayout::variable(
            id(namespace, ids::WORK_ORDER_VARIABLE_TYPE),
            QualifiedName::new(namespace, "WorkOrderVariableType"),
            DataTypeId::BaseDataType.into(),
        )
        .with_child(property(ids::WORK_ORDER_ASSET_ID, "AssetID", DataTypeId::String))
        .with_child(property(ids::WORK_ORDER_ID, "ID", DataTypeId::Guid))
        .with_child(property(ids::WORK_ORDER_START_TIME, "StartTime", DataTypeId::DateTime));
        Self { layout }
    }
}

impl TypeModel for WorkOrderModel {
    fn layout(&self) -> &TypeLayout {
        &self.layout
    }
}
