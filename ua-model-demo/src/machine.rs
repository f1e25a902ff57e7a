//! MachineType: a temperature sensor and a writable heater switch.

use crate::{
    identifiers::{self as ids, id},
    object::DemoObject,
    sensors::sensor_declaration,
};
use opcua::types::{DataTypeId, QualifiedName};
use std::sync::Arc;
use ua_model_core::{
    builtin, node::ACCESS_READ_WRITE, ChildLayout, Declaration, DeclarationTree, Instance,
    ModellingRule, TypeLayout, TypeModel, UaObject,
};

pub struct MachineModel {
    layout: TypeLayout,
}

impl MachineModel {
    pub fn new(namespace: u16) -> Self {
        let eu_range = Declaration::variable(
            id(namespace, ids::MACHINE_EU_RANGE),
            QualifiedName::new(0, "EURange"),
            DataTypeId::Range.into(),
            builtin::property_type(),
        )
        .with_modelling_rule(ModellingRule::Mandatory);
        let temperature = Declaration::variable(
            id(namespace, ids::MACHINE_TEMPERATURE),
            QualifiedName::new(namespace, "Temperature"),
            DataTypeId::Double.into(),
            builtin::analog_item_type(),
        )
        .with_access_level(ACCESS_READ_WRITE)
        .with_modelling_rule(ModellingRule::Mandatory);
        let temperature_sensor = sensor_declaration(
            namespace,
            id(namespace, ids::MACHINE_TEMPERATURE_SENSOR),
            "TemperatureSensor",
            ids::TEMPERATURE_SENSOR_TYPE,
            DeclarationTree::new(temperature).property(DeclarationTree::new(eu_range)),
        );
        let heater_switch = Declaration::variable(
            id(namespace, ids::MACHINE_HEATER_SWITCH),
            QualifiedName::new(namespace, "HeaterSwitch"),
            DataTypeId::Boolean.into(),
            builtin::base_data_variable_type(),
        )
        .with_value(false)
        .with_access_level(ACCESS_READ_WRITE);

        let layout = TypeLayout::object(
            id(namespace, ids::MACHINE_TYPE),
            QualifiedName::new(namespace, "MachineType"),
        )
        .with_child(ChildLayout::component(ModellingRule::Mandatory, temperature_sensor))
        .with_child(ChildLayout::component(
            ModellingRule::Mandatory,
            DeclarationTree::new(heater_switch),
        ));
        Self { layout }
    }
}

impl TypeModel for MachineModel {
    fn layout(&self) -> &TypeLayout {
        &self.layout
    }

    fn wrap(&self, instance: Instance) -> Arc<dyn UaObject> {
        Arc::new(DemoObject::Machine(instance))
    }
}
