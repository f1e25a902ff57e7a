//! The BoilerDemo information model: temperature and fill level sensors, a
//! boiler with `Fill`/`Heat` methods, a machine and a work order variable.
pub mod boiler;
pub mod factory;
pub mod heater_status;
pub mod identifiers;
pub mod machine;
pub mod namespace;
pub mod object;
pub mod sensors;
pub mod work_order;

pub use boiler::{Boiler, BoilerModel};
pub use factory::DemoNamespaceFactory;
pub use heater_status::HeaterStatus;
pub use namespace::BoilerDemo;
pub use object::DemoObject;
