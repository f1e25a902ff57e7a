use crate::{
    boiler::BoilerModel,
    heater_status::HeaterStatus,
    identifiers::{self as ids, id},
    machine::MachineModel,
    sensors::SensorModel,
    work_order::WorkOrderModel,
};
use opcua::types::{Identifier, NodeId, Variant};
use std::sync::Arc;
use ua_model_core::{NamespaceFactory, TypeModel};

/// Sub-factory of the demo namespace.
pub struct DemoNamespaceFactory {
    namespace: u16,
    temperature_sensor: Arc<SensorModel>,
    fill_level_sensor: Arc<SensorModel>,
    boiler: Arc<BoilerModel>,
    machine: Arc<MachineModel>,
    work_order: Arc<WorkOrderModel>,
}

impl DemoNamespaceFactory {
    pub fn new(namespace: u16) -> Self {
        Self {
            namespace,
            temperature_sensor: Arc::new(SensorModel::temperature(namespace)),
            fill_level_sensor: Arc::new(SensorModel::fill_level(namespace)),
            boiler: Arc::new(BoilerModel::new(namespace)),
            machine: Arc::new(MachineModel::new(namespace)),
            work_order: Arc::new(WorkOrderModel::new(namespace)),
        }
    }

    #[inline]
    pub fn boiler_model(&self) -> &Arc<BoilerModel> {
        &self.boiler
    }

    /// Every type of the namespace, in an order where each type comes after
    /// the types its template instantiates.
    pub fn type_ids(&self) -> Vec<NodeId> {
        [
            ids::TEMPERATURE_SENSOR_TYPE,
            ids::FILL_LEVEL_SENSOR_TYPE,
            ids::BOILER_TYPE,
            ids::MACHINE_TYPE,
            ids::WORK_ORDER_VARIABLE_TYPE,
        ]
        .into_iter()
        .map(|n| id(self.namespace, n))
        .collect()
    }
}

impl NamespaceFactory for DemoNamespaceFactory {
    fn namespace_index(&self) -> u16 {
        self.namespace
    }

    fn type_model(&self, type_id: &NodeId) -> Option<Arc<dyn TypeModel>> {
        if type_id.namespace != self.namespace {
            return None;
        }
        let Identifier::Numeric(n) = type_id.identifier else {
            return None;
        };
        let model: Arc<dyn TypeModel> = match n {
            ids::TEMPERATURE_SENSOR_TYPE => self.temperature_sensor.clone(),
            ids::FILL_LEVEL_SENSOR_TYPE => self.fill_level_sensor.clone(),
            ids::BOILER_TYPE => self.boiler.clone(),
            ids::MACHINE_TYPE => self.machine.clone(),
            ids::WORK_ORDER_VARIABLE_TYPE => self.work_order.clone(),
            _ => return None,
        };
        Some(model)
    }

    fn default_value(&self, data_type: &NodeId, value_rank: i32) -> Option<Variant> {
        (value_rank < 0 && *data_type == id(self.namespace, ids::HEATER_STATUS_DATA_TYPE))
            .then(|| HeaterStatus::Off.into())
    }
}
