//! BoilerType: two sensors, their set points, the heater state and the
//! `Fill`/`Heat` methods.

use crate::{
    heater_status::HeaterStatus,
    identifiers::{self as ids, id},
    object::DemoObject,
    sensors::{analog_item, sensor_declaration},
};
use dashmap::DashMap;
use opcua::types::{DataTypeId, NodeId, QualifiedName, StatusCode, Variant};
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use ua_model_core::{
    builtin,
    instance::InstanceGuard,
    method::{error_status, MethodOutcome},
    BoundMethod, ChildLayout, Declaration, DeclarationTree, Instance, MethodArgument, MethodLayout,
    ModellingRule, TypeLayout, TypeModel, UaObject,
};
use ua_model_error::{ModelError, ModelResult};

const FILL_LEVEL: &[&str] = &["FillLevelSensor", "FillLevel"];
const FILL_LEVEL_SET_POINT: &[&str] = &["FillLevelSetPoint"];
const TEMPERATURE: &[&str] = &["TemperatureSensor", "Temperature"];
const TEMPERATURE_SET_POINT: &[&str] = &["TemperatureSetPoint"];
const HEATER_STATUS: &[&str] = &["HeaterStatus"];

fn set_point(namespace: u16, node_id: u32, name: &str) -> DeclarationTree {
    DeclarationTree::new(
        Declaration::variable(
            id(namespace, node_id),
            QualifiedName::new(namespace, name),
            DataTypeId::Double.into(),
            builtin::base_data_variable_type(),
        )
        .with_value(0.0),
    )
}

fn set_point_method(
    namespace: u16,
    node_id: u32,
    name: &str,
    arguments_id: u32,
    description: &str,
) -> MethodLayout {
    MethodLayout::new(id(namespace, node_id), QualifiedName::new(namespace, name)).with_input(
        id(namespace, arguments_id),
        vec![MethodArgument::scalar("SetPoint", DataTypeId::Double, description)],
    )
}

pub struct BoilerModel {
    layout: TypeLayout,
    boilers: DashMap<NodeId, Weak<DemoObject>>,
}

impl BoilerModel {
    pub fn new(namespace: u16) -> Self {
        let fill_level_sensor = sensor_declaration(
            namespace,
            id(namespace, ids::BOILER_FILL_LEVEL_SENSOR),
            "FillLevelSensor",
            ids::FILL_LEVEL_SENSOR_TYPE,
            analog_item(namespace, ids::BOILER_FILL_LEVEL, "FillLevel"),
        );
        let temperature_sensor = sensor_declaration(
            namespace,
            id(namespace, ids::BOILER_TEMPERATURE_SENSOR),
            "TemperatureSensor",
            ids::TEMPERATURE_SENSOR_TYPE,
            analog_item(namespace, ids::BOILER_TEMPERATURE, "Temperature"),
        );
        let heater_status = DeclarationTree::new(Declaration::variable(
            id(namespace, ids::BOILER_HEATER_STATUS),
            QualifiedName::new(namespace, "HeaterStatus"),
            id(namespace, ids::HEATER_STATUS_DATA_TYPE),
            builtin::base_data_variable_type(),
        ));

        let layout = TypeLayout::object(
            id(namespace, ids::BOILER_TYPE),
            QualifiedName::new(namespace, "BoilerType"),
        )
        .with_child(ChildLayout::component(ModellingRule::Mandatory, fill_level_sensor))
        .with_child(ChildLayout::component(
            ModellingRule::Mandatory,
            set_point(namespace, ids::BOILER_FILL_LEVEL_SET_POINT, "FillLevelSetPoint"),
        ))
        .with_child(ChildLayout::component(ModellingRule::Mandatory, heater_status))
        .with_child(ChildLayout::component(ModellingRule::Mandatory, temperature_sensor))
        .with_child(ChildLayout::component(
            ModellingRule::Mandatory,
            set_point(namespace, ids::BOILER_TEMPERATURE_SET_POINT, "TemperatureSetPoint"),
        ))
        .with_child(ChildLayout::method(
            ModellingRule::Mandatory,
            set_point_method(
                namespace,
                ids::BOILER_FILL,
                "Fill",
                ids::BOILER_FILL_INPUT_ARGUMENTS,
                "FillLevel Setpoint [l]",
            ),
        ))
        .with_child(ChildLayout::method(
            ModellingRule::Mandatory,
            set_point_method(
                namespace,
                ids::BOILER_HEAT,
                "Heat",
                ids::BOILER_HEAT_INPUT_ARGUMENTS,
                "Temperature Setpoint [°C]",
            ),
        ));

        Self {
            layout,
            boilers: DashMap::new(),
        }
    }

    /// Live boilers, ordered by node id.
    pub fn boilers(&self) -> Vec<Arc<DemoObject>> {
        let mut boilers: Vec<Arc<DemoObject>> =
            self.boilers.iter().filter_map(|b| b.value().upgrade()).collect();
        boilers.sort_by_key(|b| b.node_id().to_string());
        boilers
    }
}

impl TypeModel for BoilerModel {
    fn layout(&self) -> &TypeLayout {
        &self.layout
    }

    fn wrap(&self, instance: Instance) -> Arc<dyn UaObject> {
        let boiler = Arc::new(DemoObject::Boiler(Boiler::new(instance)));
        // A construction that later fails to commit must not displace a live
        // boiler with the same id.
        self.boilers.retain(|_, b| b.strong_count() > 0);
        self.boilers
            .entry(boiler.node_id().clone())
            .or_insert_with(|| Arc::downgrade(&boiler));
        boiler
    }

    fn clear_static_members(&self) {
        self.boilers.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoilerMethod {
    Fill,
    Heat,
}

impl BoilerMethod {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "Fill" => Some(BoilerMethod::Fill),
            "Heat" => Some(BoilerMethod::Heat),
            _ => None,
        }
    }
}

/// Runtime object of a BoilerType instance.
pub struct Boiler {
    instance: Instance,
}

impl Boiler {
    pub fn new(instance: Instance) -> Self {
        Self { instance }
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn resolve_method(&self, method_id: &NodeId) -> Option<BoundMethod> {
        self.instance
            .method_by_id(method_id)
            .filter(|m| BoilerMethod::from_name(m.name()).is_some())
            .cloned()
    }

    pub async fn call(&self, method: &BoundMethod, input_arguments: &[Variant]) -> MethodOutcome {
        let Some(kind) = BoilerMethod::from_name(method.name()) else {
            return MethodOutcome::status(StatusCode::BadInvalidArgument);
        };
        let Some(Variant::Double(set_point)) = input_arguments.first() else {
            return MethodOutcome::status(StatusCode::BadInvalidArgument);
        };
        let result = match kind {
            BoilerMethod::Fill => self.fill(*set_point),
            BoilerMethod::Heat => self.heat(*set_point).map(|_| ()),
        };
        match result {
            Ok(()) => MethodOutcome::good(Vec::new()),
            Err(status) => MethodOutcome::status(status),
        }
    }

    /// Set the fill level set point. Negative set points are rejected.
    pub fn fill(&self, set_point: f64) -> Result<(), StatusCode> {
        if set_point < 0.0 {
            return Err(StatusCode::BadOutOfRange);
        }
        let guard = self.instance.lock();
        guard
            .write(FILL_LEVEL_SET_POINT, Variant::Double(set_point))
            .map_err(|e| error_status(&e))?;
        debug!(boiler = %self.instance.node_id(), set_point, "Fill level set point changed");
        Ok(())
    }

    /// Set the temperature set point and switch the heater toward it.
    pub fn heat(&self, set_point: f64) -> Result<HeaterStatus, StatusCode> {
        let status = apply_heat(&self.instance.lock(), set_point).map_err(|e| error_status(&e))?;
        debug!(
            boiler = %self.instance.node_id(),
            set_point,
            heater = %status,
            "Temperature set point changed"
        );
        Ok(status)
    }

    pub fn heater_status(&self) -> ModelResult<HeaterStatus> {
        let value = self.instance.read(HEATER_STATUS)?;
        HeaterStatus::try_from(&value)
            .map_err(|_| ModelError::TypeMismatch(format!("HeaterStatus holds {value:?}")))
    }

    /// Move the fill level and the temperature toward their set points by at
    /// most `rate` each. The heater switches off once the temperature is
    /// reached.
    pub fn simulate_step(&self, rate: f64) -> ModelResult<()> {
        let guard = self.instance.lock();

        let level = read_f64(&guard, FILL_LEVEL)?;
        let level_set_point = read_f64(&guard, FILL_LEVEL_SET_POINT)?;
        guard.write(FILL_LEVEL, Variant::Double(approach(level, level_set_point, rate)))?;

        let temperature = read_f64(&guard, TEMPERATURE)?;
        let temperature_set_point = read_f64(&guard, TEMPERATURE_SET_POINT)?;
        let next = approach(temperature, temperature_set_point, rate);
        guard.write(TEMPERATURE, Variant::Double(next))?;

        if next == temperature_set_point {
            let status = guard.read(HEATER_STATUS)?;
            if HeaterStatus::try_from(&status) != Ok(HeaterStatus::Off) {
                guard.write(HEATER_STATUS, HeaterStatus::Off.into())?;
                info!(
                    boiler = %self.instance.node_id(),
                    temperature = next,
                    "Set point reached, heater off"
                );
            }
        }
        Ok(())
    }
}

fn apply_heat(guard: &InstanceGuard<'_>, set_point: f64) -> ModelResult<HeaterStatus> {
    let status = HeaterStatus::toward(read_f64(guard, TEMPERATURE)?, set_point);
    guard.write(TEMPERATURE_SET_POINT, Variant::Double(set_point))?;
    guard.write(HEATER_STATUS, status.into())?;
    Ok(status)
}

fn read_f64(guard: &InstanceGuard<'_>, path: &[&str]) -> ModelResult<f64> {
    match guard.read(path)? {
        Variant::Double(value) => Ok(value),
        Variant::Empty => Ok(0.0),
        other => Err(ModelError::TypeMismatch(format!(
            "{} holds {other:?}",
            path.join("/")
        ))),
    }
}

fn approach(current: f64, target: f64, rate: f64) -> f64 {
    let step = rate.abs();
    if (target - current).abs() <= step {
        target
    } else if target > current {
        current + step
    } else {
        current - step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approach() {
        assert_eq!(approach(0.0, 10.0, 0.5), 0.5);
        assert_eq!(approach(10.0, 0.0, 0.5), 9.5);
        assert_eq!(approach(9.8, 10.0, 0.5), 10.0);
        assert_eq!(approach(3.0, 3.0, 0.5), 3.0);
    }

    #[test]
    fn test_layout_order() {
        let model = BoilerModel::new(2);
        let names: Vec<String> = model
            .layout()
            .children
            .iter()
            .map(|c| c.browse_name().name.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "FillLevelSensor",
                "FillLevelSetPoint",
                "HeaterStatus",
                "TemperatureSensor",
                "TemperatureSetPoint",
                "Fill",
                "Heat"
            ]
        );
        assert!(model
            .layout()
            .children
            .iter()
            .all(|c| c.modelling_rule == ModellingRule::Mandatory));
    }
}
