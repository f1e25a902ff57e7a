//! Well-known namespace 0 nodes the engine relies on, and the default values
//! of the built-in data types.

use opcua::types::{
    DataTypeId, Identifier, NodeId, ObjectId, ObjectTypeId, UAString, VariableTypeId, Variant,
};

pub const NS0_URI: &str = "http://opcfoundation.org/UA/";

pub fn root_folder() -> NodeId {
    ObjectId::RootFolder.into()
}

pub fn objects_folder() -> NodeId {
    ObjectId::ObjectsFolder.into()
}

pub fn types_folder() -> NodeId {
    ObjectId::TypesFolder.into()
}

pub fn object_types_folder() -> NodeId {
    ObjectId::ObjectTypesFolder.into()
}

pub fn variable_types_folder() -> NodeId {
    ObjectId::VariableTypesFolder.into()
}

pub fn base_object_type() -> NodeId {
    ObjectTypeId::BaseObjectType.into()
}

pub fn folder_type() -> NodeId {
    ObjectTypeId::FolderType.into()
}

pub fn modelling_rule_type() -> NodeId {
    ObjectTypeId::ModellingRuleType.into()
}

pub fn base_variable_type() -> NodeId {
    VariableTypeId::BaseVariableType.into()
}

pub fn base_data_variable_type() -> NodeId {
    VariableTypeId::BaseDataVariableType.into()
}

pub fn property_type() -> NodeId {
    VariableTypeId::PropertyType.into()
}

pub fn data_item_type() -> NodeId {
    VariableTypeId::DataItemType.into()
}

pub fn analog_item_type() -> NodeId {
    VariableTypeId::AnalogItemType.into()
}

pub fn modelling_rule_mandatory() -> NodeId {
    ObjectId::ModellingRule_Mandatory.into()
}

pub fn modelling_rule_optional() -> NodeId {
    ObjectId::ModellingRule_Optional.into()
}

/// Object types namespace 0 instantiates as plain generic objects.
pub fn is_generic_object_type(type_definition: &NodeId) -> bool {
    *type_definition == base_object_type() || *type_definition == folder_type()
}

/// Variable types namespace 0 instantiates generically: the node plus every
/// declared child.
pub fn is_generic_variable_type(type_definition: &NodeId) -> bool {
    [
        base_variable_type(),
        base_data_variable_type(),
        property_type(),
        data_item_type(),
        analog_item_type(),
    ]
    .contains(type_definition)
}

/// Default value for a variable of a namespace 0 data type.
///
/// Arrays and data types without a natural zero get an empty value.
pub fn default_value(data_type: &NodeId, value_rank: i32) -> Variant {
    if data_type.namespace != 0 || value_rank >= 0 {
        return Variant::Empty;
    }
    let Identifier::Numeric(id) = data_type.identifier else {
        return Variant::Empty;
    };
    match id {
        x if x == DataTypeId::Boolean as u32 => Variant::Boolean(false),
        x if x == DataTypeId::SByte as u32 => Variant::SByte(0),
        x if x == DataTypeId::Byte as u32 => Variant::Byte(0),
        x if x == DataTypeId::Int16 as u32 => Variant::Int16(0),
        x if x == DataTypeId::UInt16 as u32 => Variant::UInt16(0),
        x if x == DataTypeId::Int32 as u32 => Variant::Int32(0),
        x if x == DataTypeId::UInt32 as u32 => Variant::UInt32(0),
        x if x == DataTypeId::Int64 as u32 => Variant::Int64(0),
        x if x == DataTypeId::UInt64 as u32 => Variant::UInt64(0),
        x if x == DataTypeId::Float as u32 => Variant::Float(0.0),
        x if x == DataTypeId::Double as u32 => Variant::Double(0.0),
        x if x == DataTypeId::String as u32 => Variant::String(UAString::from("")),
        x if x == DataTypeId::Enumeration as u32 => Variant::Int32(0),
        _ => Variant::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_defaults() {
        assert_eq!(
            default_value(&DataTypeId::Double.into(), -1),
            Variant::Double(0.0)
        );
        assert_eq!(
            default_value(&DataTypeId::Boolean.into(), -1),
            Variant::Boolean(false)
        );
        assert_eq!(default_value(&DataTypeId::Int32.into(), -1), Variant::Int32(0));
    }

    #[test]
    fn test_arrays_and_foreign_types_are_empty() {
        assert_eq!(default_value(&DataTypeId::Double.into(), 1), Variant::Empty);
        assert_eq!(default_value(&NodeId::new(2, 3001u32), -1), Variant::Empty);
        assert_eq!(default_value(&DataTypeId::Range.into(), -1), Variant::Empty);
    }

    #[test]
    fn test_generic_type_tables() {
        assert!(is_generic_variable_type(&analog_item_type()));
        assert!(is_generic_object_type(&folder_type()));
        assert!(!is_generic_object_type(&analog_item_type()));
    }
}
