use opcua::types::Variant;
use std::fmt;

/// State of a boiler's heater, stored as an Int32 enumeration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum HeaterStatus {
    #[default]
    Off = 0,
    Heating = 1,
    Cooling = 2,
}

impl HeaterStatus {
    /// Status needed to move `current` toward `set_point`.
    pub fn toward(current: f64, set_point: f64) -> Self {
        if set_point > current {
            HeaterStatus::Heating
        } else if set_point < current {
            HeaterStatus::Cooling
        } else {
            HeaterStatus::Off
        }
    }
}

impl TryFrom<i32> for HeaterStatus {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(HeaterStatus::Off),
            1 => Ok(HeaterStatus::Heating),
            2 => Ok(HeaterStatus::Cooling),
            other => Err(other),
        }
    }
}

impl TryFrom<&Variant> for HeaterStatus {
    type Error = ();

    fn try_from(value: &Variant) -> Result<Self, Self::Error> {
        match value {
            Variant::Int32(n) => HeaterStatus::try_from(*n).map_err(|_| ()),
            _ => Err(()),
        }
    }
}

impl From<HeaterStatus> for Variant {
    fn from(status: HeaterStatus) -> Self {
        Variant::Int32(status as i32)
    }
}

impl fmt::Display for HeaterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeaterStatus::Off => "Off",
            HeaterStatus::Heating => "Heating",
            HeaterStatus::Cooling => "Cooling",
        };
        f.write_str(name)
    }
}
