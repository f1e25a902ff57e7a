//! Numeric identifiers of the demo namespace.
//!
//! Type nodes and their instance declarations keep fixed ids so a client can
//! address a template method (e.g. `Heat`) on any boiler.

use opcua::types::NodeId;

pub const TEMPERATURE_SENSOR_TYPE: u32 = 1001;
pub const FILL_LEVEL_SENSOR_TYPE: u32 = 1002;
pub const BOILER_TYPE: u32 = 1003;
pub const MACHINE_TYPE: u32 = 1004;

pub const WORK_ORDER_VARIABLE_TYPE: u32 = 2001;

pub const HEATER_STATUS_DATA_TYPE: u32 = 3001;

pub const BOILER_TEMPERATURE_SENSOR: u32 = 5001;
pub const BOILER_FILL_LEVEL_SENSOR: u32 = 5002;
pub const MACHINE_TEMPERATURE_SENSOR: u32 = 5065;

/// Ids of one analog sensor's measurement and its properties.
#[derive(Debug, Clone, Copy)]
pub struct SensorIds {
    pub value: u32,
    pub engineering_units: u32,
    pub eu_range: u32,
    pub instrument_range: u32,
    pub definition: u32,
    pub value_precision: u32,
}

pub const TEMPERATURE: SensorIds = SensorIds {
    value: 6001,
    engineering_units: 6002,
    eu_range: 6003,
    instrument_range: 6004,
    definition: 6005,
    value_precision: 6006,
};

pub const FILL_LEVEL: SensorIds = SensorIds {
    value: 6007,
    engineering_units: 6008,
    eu_range: 6009,
    instrument_range: 6010,
    definition: 6011,
    value_precision: 6012,
};

/// Declarations inside BoilerType's `TemperatureSensor`.
pub const BOILER_TEMPERATURE: SensorIds = SensorIds {
    value: 6013,
    engineering_units: 6014,
    eu_range: 6015,
    instrument_range: 6016,
    definition: 6017,
    value_precision: 6018,
};

/// Declarations inside BoilerType's `FillLevelSensor`.
pub const BOILER_FILL_LEVEL: SensorIds = SensorIds {
    value: 6019,
    engineering_units: 6020,
    eu_range: 6021,
    instrument_range: 6022,
    definition: 6023,
    value_precision: 6024,
};

pub const BOILER_FILL_LEVEL_SET_POINT: u32 = 6025;
pub const BOILER_TEMPERATURE_SET_POINT: u32 = 6026;
pub const BOILER_HEATER_STATUS: u32 = 6027;
pub const BOILER_FILL_INPUT_ARGUMENTS: u32 = 6029;
pub const BOILER_HEAT_INPUT_ARGUMENTS: u32 = 6030;

pub const WORK_ORDER_ASSET_ID: u32 = 6031;
pub const WORK_ORDER_ID: u32 = 6032;
pub const WORK_ORDER_START_TIME: u32 = 6033;

pub const MACHINE_TEMPERATURE: u32 = 6250;
pub const MACHINE_EU_RANGE: u32 = 6251;
pub const MACHINE_HEATER_SWITCH: u32 = 6256;

pub const BOILER_HEAT: u32 = 7001;
pub const BOILER_FILL: u32 = 7002;

#[inline]
pub fn id(namespace: u16, value: u32) -> NodeId {
    NodeId::new(namespace, value)
}
