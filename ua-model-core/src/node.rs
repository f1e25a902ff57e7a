use crate::builtin;
use chrono::{DateTime, Utc};
use opcua::types::{
    DataTypeId, LocalizedText, NodeId, QualifiedName, ReferenceTypeId, StatusCode, Variant,
};
use std::sync::Arc;

/// Access level bit: the current value may be read.
pub const ACCESS_CURRENT_READ: u8 = 0x01;
/// Access level bit: the current value may be written.
pub const ACCESS_CURRENT_WRITE: u8 = 0x02;
pub const ACCESS_READ_WRITE: u8 = ACCESS_CURRENT_READ | ACCESS_CURRENT_WRITE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeClass {
    Object,
    Variable,
    Method,
    ObjectType,
    VariableType,
    ReferenceType,
    DataType,
    View,
}

/// Reference types used by the engine.
///
/// Everything except `HasTypeDefinition` and `HasModellingRule` is
/// hierarchical and therefore gives its target a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Organizes,
    HasComponent,
    HasProperty,
    HasSubtype,
    HasTypeDefinition,
    HasModellingRule,
}

impl ReferenceKind {
    #[inline]
    pub fn is_hierarchical(self) -> bool {
        !matches!(
            self,
            ReferenceKind::HasTypeDefinition | ReferenceKind::HasModellingRule
        )
    }

    pub fn node_id(self) -> NodeId {
        match self {
            ReferenceKind::Organizes => ReferenceTypeId::Organizes.into(),
            ReferenceKind::HasComponent => ReferenceTypeId::HasComponent.into(),
            ReferenceKind::HasProperty => ReferenceTypeId::HasProperty.into(),
            ReferenceKind::HasSubtype => ReferenceTypeId::HasSubtype.into(),
            ReferenceKind::HasTypeDefinition => ReferenceTypeId::HasTypeDefinition.into(),
            ReferenceKind::HasModellingRule => ReferenceTypeId::HasModellingRule.into(),
        }
    }
}

/// Whether instances of a type must (or may) carry a template child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModellingRule {
    Mandatory,
    Optional,
}

impl ModellingRule {
    pub fn node_id(self) -> NodeId {
        match self {
            ModellingRule::Mandatory => builtin::modelling_rule_mandatory(),
            ModellingRule::Optional => builtin::modelling_rule_optional(),
        }
    }

    /// Resolve a modelling-rule object id. Null and unknown ids resolve to `None`.
    pub fn from_node_id(node_id: &NodeId) -> Option<Self> {
        if node_id.is_null() {
            None
        } else if *node_id == builtin::modelling_rule_mandatory() {
            Some(ModellingRule::Mandatory)
        } else if *node_id == builtin::modelling_rule_optional() {
            Some(ModellingRule::Optional)
        } else {
            None
        }
    }
}

/// One entry of a method's argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodArgument {
    pub name: String,
    pub data_type: NodeId,
    /// -1 for scalars, n >= 1 for n-dimensional arrays.
    pub value_rank: i32,
    pub array_dimensions: Vec<u32>,
    pub description: LocalizedText,
}

impl MethodArgument {
    pub fn scalar(name: &str, data_type: impl Into<NodeId>, description: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.into(),
            value_rank: -1,
            array_dimensions: Vec::new(),
            description: LocalizedText::new("", description),
        }
    }
}

/// Last known value of a variable.
#[derive(Debug, Clone)]
pub struct CachedValue {
    pub value: Variant,
    pub status: StatusCode,
    pub source_timestamp: DateTime<Utc>,
}

impl CachedValue {
    pub fn new(value: Variant) -> Self {
        Self {
            value,
            status: StatusCode::Good,
            source_timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VariableBody {
    pub data_type: NodeId,
    pub value_rank: i32,
    pub access_level: u8,
    pub user_access_level: u8,
    pub value: CachedValue,
    /// Set on `InputArguments`/`OutputArguments` properties.
    pub arguments: Option<Arc<[MethodArgument]>>,
}

/// Per-class attributes of a node.
#[derive(Debug, Clone)]
pub enum NodeBody {
    Object {
        event_notifier: u8,
    },
    Variable(VariableBody),
    Method {
        executable: bool,
        user_executable: bool,
    },
    ObjectType {
        is_abstract: bool,
    },
    VariableType {
        is_abstract: bool,
        data_type: NodeId,
        value_rank: i32,
    },
    ReferenceType {
        is_abstract: bool,
        symmetric: bool,
        inverse_name: Option<LocalizedText>,
    },
    DataType {
        is_abstract: bool,
    },
    View {
        contains_no_loops: bool,
        event_notifier: u8,
    },
}

/// A node of the address space graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub node_id: NodeId,
    pub browse_name: QualifiedName,
    pub display_name: LocalizedText,
    pub description: Option<LocalizedText>,
    /// Target of the HasTypeDefinition reference, for objects and variables.
    pub type_definition: Option<NodeId>,
    pub modelling_rule: Option<ModellingRule>,
    pub body: NodeBody,
}

impl Node {
    fn with_body(node_id: NodeId, browse_name: QualifiedName, body: NodeBody) -> Self {
        let display_name = LocalizedText::new("", browse_name.name.as_ref());
        Self {
            node_id,
            browse_name,
            display_name,
            description: None,
            type_definition: None,
            modelling_rule: None,
            body,
        }
    }

    pub fn object(node_id: NodeId, browse_name: QualifiedName, type_definition: NodeId) -> Self {
        let mut node = Self::with_body(node_id, browse_name, NodeBody::Object { event_notifier: 0 });
        node.type_definition = Some(type_definition);
        node
    }

    pub fn folder(node_id: NodeId, browse_name: QualifiedName) -> Self {
        Self::object(node_id, browse_name, builtin::folder_type())
    }

    /// A scalar, read-only `BaseDataVariableType` variable.
    pub fn variable(
        node_id: NodeId,
        browse_name: QualifiedName,
        data_type: NodeId,
        value: Variant,
    ) -> Self {
        let mut node = Self::with_body(
            node_id,
            browse_name,
            NodeBody::Variable(VariableBody {
                data_type,
                value_rank: -1,
                access_level: ACCESS_CURRENT_READ,
                user_access_level: ACCESS_CURRENT_READ,
                value: CachedValue::new(value),
                arguments: None,
            }),
        );
        node.type_definition = Some(builtin::base_data_variable_type());
        node
    }

    pub fn property(
        node_id: NodeId,
        browse_name: QualifiedName,
        data_type: NodeId,
        value: Variant,
    ) -> Self {
        let mut node = Self::variable(node_id, browse_name, data_type, value);
        node.type_definition = Some(builtin::property_type());
        node
    }

    /// An `InputArguments`/`OutputArguments` property carrying a fixed argument list.
    pub fn arguments_property(
        node_id: NodeId,
        browse_name: QualifiedName,
        arguments: Arc<[MethodArgument]>,
    ) -> Self {
        let mut node = Self::property(
            node_id,
            browse_name,
            DataTypeId::Argument.into(),
            Variant::Empty,
        )
        .with_value_rank(1);
        if let NodeBody::Variable(body) = &mut node.body {
            body.arguments = Some(arguments);
        }
        node
    }

    pub fn method(node_id: NodeId, browse_name: QualifiedName) -> Self {
        Self::with_body(
            node_id,
            browse_name,
            NodeBody::Method {
                executable: true,
                user_executable: true,
            },
        )
    }

    pub fn object_type(node_id: NodeId, browse_name: QualifiedName, is_abstract: bool) -> Self {
        Self::with_body(node_id, browse_name, NodeBody::ObjectType { is_abstract })
    }

    pub fn variable_type(
        node_id: NodeId,
        browse_name: QualifiedName,
        data_type: NodeId,
        value_rank: i32,
        is_abstract: bool,
    ) -> Self {
        Self::with_body(
            node_id,
            browse_name,
            NodeBody::VariableType {
                is_abstract,
                data_type,
                value_rank,
            },
        )
    }

    pub fn with_display_name(mut self, text: &str) -> Self {
        self.display_name = LocalizedText::new("", text);
        self
    }

    pub fn with_description(mut self, text: &str) -> Self {
        self.description = Some(LocalizedText::new("", text));
        self
    }

    pub fn with_modelling_rule(mut self, rule: Option<ModellingRule>) -> Self {
        self.modelling_rule = rule;
        self
    }

    pub fn with_type_definition(mut self, type_definition: NodeId) -> Self {
        self.type_definition = Some(type_definition);
        self
    }

    pub fn with_access_level(mut self, access_level: u8) -> Self {
        if let NodeBody::Variable(body) = &mut self.body {
            body.access_level = access_level;
            body.user_access_level = access_level;
        }
        self
    }

    pub fn with_value_rank(mut self, value_rank: i32) -> Self {
        if let NodeBody::Variable(body) = &mut self.body {
            body.value_rank = value_rank;
        }
        self
    }

    pub fn node_class(&self) -> NodeClass {
        match self.body {
            NodeBody::Object { .. } => NodeClass::Object,
            NodeBody::Variable(_) => NodeClass::Variable,
            NodeBody::Method { .. } => NodeClass::Method,
            NodeBody::ObjectType { .. } => NodeClass::ObjectType,
            NodeBody::VariableType { .. } => NodeClass::VariableType,
            NodeBody::ReferenceType { .. } => NodeClass::ReferenceType,
            NodeBody::DataType { .. } => NodeClass::DataType,
            NodeBody::View { .. } => NodeClass::View,
        }
    }

    pub fn as_variable(&self) -> Option<&VariableBody> {
        match &self.body {
            NodeBody::Variable(body) => Some(body),
            _ => None,
        }
    }

    pub fn as_variable_mut(&mut self) -> Option<&mut VariableBody> {
        match &mut self.body {
            NodeBody::Variable(body) => Some(body),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_defaults() {
        let node = Node::variable(
            NodeId::new(2, "v"),
            QualifiedName::new(2, "Level"),
            DataTypeId::Double.into(),
            Variant::Double(1.5),
        );
        assert_eq!(node.node_class(), NodeClass::Variable);
        assert_eq!(node.display_name.text.as_ref(), "Level");
        let body = node.as_variable().unwrap();
        assert_eq!(body.value_rank, -1);
        assert_eq!(body.access_level, ACCESS_CURRENT_READ);
        assert_eq!(body.value.value, Variant::Double(1.5));
    }

    #[test]
    fn test_arguments_property() {
        let args: Arc<[MethodArgument]> =
            vec![MethodArgument::scalar("SetPoint", DataTypeId::Double, "Setpoint")].into();
        let node = Node::arguments_property(
            NodeId::new(2, "m.InputArguments"),
            QualifiedName::new(0, "InputArguments"),
            args,
        );
        assert_eq!(node.type_definition, Some(builtin::property_type()));
        let body = node.as_variable().unwrap();
        assert_eq!(body.value_rank, 1);
        assert_eq!(body.arguments.as_ref().map(|a| a.len()), Some(1));
    }

    #[test]
    fn test_modelling_rule_ids() {
        assert_eq!(
            ModellingRule::from_node_id(&ModellingRule::Mandatory.node_id()),
            Some(ModellingRule::Mandatory)
        );
        assert_eq!(ModellingRule::from_node_id(&NodeId::null()), None);
        assert!(!ReferenceKind::HasTypeDefinition.is_hierarchical());
        assert!(ReferenceKind::HasProperty.is_hierarchical());
    }
}
