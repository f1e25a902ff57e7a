//! TemperatureSensorType and FillLevelSensorType: an object holding one
//! analog measurement with the usual AnalogItem properties.

use crate::{
    identifiers::{self, id, SensorIds},
    object::DemoObject,
};
use opcua::types::{DataTypeId, NodeId, QualifiedName};
use std::sync::Arc;
use ua_model_core::{
    builtin,
    node::ACCESS_READ_WRITE,
    ChildLayout, Declaration, DeclarationTree, Instance, ModellingRule, TypeLayout, TypeModel,
    UaObject,
};

fn property(
    namespace: u16,
    node_id: u32,
    name: &str,
    data_type: DataTypeId,
    rule: ModellingRule,
) -> DeclarationTree {
    DeclarationTree::new(
        Declaration::variable(
            id(namespace, node_id),
            QualifiedName::new(0, name),
            data_type.into(),
            builtin::property_type(),
        )
        .with_modelling_rule(rule),
    )
}

/// Declaration of a Double AnalogItem `name` and its properties. Only
/// `EURange` is Mandatory.
pub fn analog_item(namespace: u16, ids: SensorIds, name: &str) -> DeclarationTree {
    let value = Declaration::variable(
        id(namespace, ids.value),
        QualifiedName::new(namespace, name),
        DataTypeId::Double.into(),
        builtin::analog_item_type(),
    )
    .with_access_level(ACCESS_READ_WRITE)
    .with_modelling_rule(ModellingRule::Mandatory);

    DeclarationTree::new(value)
        .property(property(
            namespace,
            ids.definition,
            "Definition",
            DataTypeId::String,
            ModellingRule::Optional,
        ))
        .property(property(
            namespace,
            ids.engineering_units,
            "EngineeringUnits",
            DataTypeId::EUInformation,
            ModellingRule::Optional,
        ))
        .property(property(
            namespace,
            ids.eu_range,
            "EURange",
            DataTypeId::Range,
            ModellingRule::Mandatory,
        ))
        .property(property(
            namespace,
            ids.instrument_range,
            "InstrumentRange",
            DataTypeId::Range,
            ModellingRule::Optional,
        ))
        .property(property(
            namespace,
            ids.value_precision,
            "ValuePrecision",
            DataTypeId::Double,
            ModellingRule::Optional,
        ))
}

/// Declaration of a sensor object of `type_id` holding one measurement.
pub fn sensor_declaration(
    namespace: u16,
    node_id: NodeId,
    name: &str,
    type_id: u32,
    measurement: DeclarationTree,
) -> DeclarationTree {
    DeclarationTree::new(
        Declaration::object(node_id, QualifiedName::new(namespace, name), id(namespace, type_id))
            .with_modelling_rule(ModellingRule::Mandatory),
    )
    .component(measurement)
}

pub struct SensorModel {
    layout: TypeLayout,
}

impl SensorModel {
    pub fn temperature(namespace: u16) -> Self {
        Self::new(
            namespace,
            identifiers::TEMPERATURE_SENSOR_TYPE,
            "TemperatureSensorType",
            analog_item(namespace, identifiers::TEMPERATURE, "Temperature"),
        )
    }

    pub fn fill_level(namespace: u16) -> Self {
        Self::new(
            namespace,
            identifiers::FILL_LEVEL_SENSOR_TYPE,
            "FillLevelSensorType",
            analog_item(namespace, identifiers::FILL_LEVEL, "FillLevel"),
        )
    }

    fn new(namespace: u16, type_id: u32, name: &str, measurement: DeclarationTree) -> Self {
        let layout = TypeLayout::object(id(namespace, type_id), QualifiedName::new(namespace, name))
            .with_child(ChildLayout::component(ModellingRule::Mandatory, measurement));
        Self { layout }
    }
}

impl TypeModel for SensorModel {
    fn layout(&self) -> &TypeLayout {
        &self.layout
    }

    fn wrap(&self, instance: Instance) -> Arc<dyn UaObject> {
        Arc::new(DemoObject::Sensor(instance))
    }
}
