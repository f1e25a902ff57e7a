mod common;

use common::{boiler, demo_space, name, node};
use opcua::types::{DataTypeId, NodeId, Variant};
use std::sync::Arc;
use ua_model_core::{
    builtin, Declaration, DeclarationArena, DeclarationTree, NodeClass, ReferenceKind,
};
use ua_model_demo::{
    identifiers::{self as ids, id},
    HeaterStatus,
};
use ua_model_error::ModelError;

fn declared_variable(ns: u16, node_id: &str, browse_name: &str) -> DeclarationTree {
    DeclarationTree::new(Declaration::variable(
        node(ns, node_id),
        name(ns, browse_name),
        DataTypeId::Double.into(),
        builtin::base_data_variable_type(),
    ))
}

fn declared_sensor(ns: u16, boiler: &str, sensor: &str, type_id: u32, measurement: &str) -> DeclarationTree {
    let sensor_id = format!("{boiler}.{sensor}");
    DeclarationTree::new(Declaration::object(
        node(ns, &sensor_id),
        name(ns, sensor),
        id(ns, type_id),
    ))
    .component(DeclarationTree::new(Declaration::variable(
        node(ns, &format!("{sensor_id}.{measurement}")),
        name(ns, measurement),
        DataTypeId::Double.into(),
        builtin::analog_item_type(),
    )))
}

fn declared_method(ns: u16, node_id: &str, browse_name: &str) -> DeclarationTree {
    DeclarationTree::new(Declaration::method(node(ns, node_id), name(ns, browse_name)))
}

/// A complete BoilerType declaration named `boiler`, without its methods.
fn declared_boiler(ns: u16, boiler: &str, type_id: NodeId) -> DeclarationTree {
    let child = |suffix: &str| format!("{boiler}.{suffix}");
    DeclarationTree::new(Declaration::object(node(ns, boiler), name(ns, boiler), type_id))
        .component(declared_sensor(
            ns,
            boiler,
            "FillLevelSensor",
            ids::FILL_LEVEL_SENSOR_TYPE,
            "FillLevel",
        ))
        .component(declared_variable(ns, &child("FillLevelSetPoint"), "FillLevelSetPoint"))
        .component(DeclarationTree::new(Declaration::variable(
            node(ns, &child("HeaterStatus")),
            name(ns, "HeaterStatus"),
            id(ns, ids::HEATER_STATUS_DATA_TYPE),
            builtin::base_data_variable_type(),
        )))
        .component(declared_sensor(
            ns,
            boiler,
            "TemperatureSensor",
            ids::TEMPERATURE_SENSOR_TYPE,
            "Temperature",
        ))
        .component(declared_variable(ns, &child("TemperatureSetPoint"), "TemperatureSetPoint"))
}

#[test]
fn test_fresh_boiler_mirrors_template() {
    let (space, demo) = demo_space();
    let ns = demo.namespace();
    let boiler = boiler(&demo, "Boiler1");
    let instance = boiler.instance();

    let children: Vec<&str> = instance
        .children()
        .iter()
        .map(|c| c.browse_name.name.as_ref())
        .collect();
    assert_eq!(
        children,
        vec![
            "FillLevelSensor",
            "FillLevelSetPoint",
            "HeaterStatus",
            "TemperatureSensor",
            "TemperatureSetPoint"
        ]
    );
    let methods: Vec<&str> = instance.methods().iter().map(|m| m.name()).collect();
    assert_eq!(methods, vec!["Fill", "Heat"]);

    let graph = space.graph().read();
    assert_eq!(
        graph.parent(&node(ns, "Boiler1")),
        Some((ReferenceKind::Organizes, demo.folder().clone()))
    );
    assert_eq!(
        graph.type_definition(&node(ns, "Boiler1.TemperatureSensor")),
        Some(id(ns, ids::TEMPERATURE_SENSOR_TYPE))
    );
    for path in [
        "Boiler1.TemperatureSensor.Temperature",
        "Boiler1.TemperatureSensor.Temperature.EURange",
        "Boiler1.FillLevelSensor.FillLevel.EURange",
        "Boiler1.Fill.InputArguments",
        "Boiler1.Heat.InputArguments",
    ] {
        assert!(graph.contains(&node(ns, path)), "{path} missing");
    }
    // Optional declarations are not copied.
    assert!(!graph.contains(&node(ns, "Boiler1.TemperatureSensor.Temperature.Definition")));
    assert!(!graph.contains(&node(ns, "Boiler1.TemperatureSensor.Temperature.EngineeringUnits")));
    drop(graph);

    assert_eq!(
        space.read_value(&node(ns, "Boiler1.HeaterStatus")).unwrap(),
        Variant::from(HeaterStatus::Off)
    );
    assert_eq!(
        space.read_value(&node(ns, "Boiler1.FillLevelSetPoint")).unwrap(),
        Variant::Double(0.0)
    );
}

#[test]
fn test_boilers_are_independent() {
    let (space, demo) = demo_space();
    let ns = demo.namespace();
    boiler(&demo, "Boiler1");
    boiler(&demo, "Boiler2");

    space
        .write_value(&node(ns, "Boiler1.TemperatureSensor.Temperature"), Variant::Double(42.0))
        .unwrap();
    assert_eq!(
        space.read_value(&node(ns, "Boiler1.TemperatureSensor.Temperature")).unwrap(),
        Variant::Double(42.0)
    );
    assert_ne!(
        space.read_value(&node(ns, "Boiler2.TemperatureSensor.Temperature")).unwrap(),
        Variant::Double(42.0)
    );
    assert_eq!(demo.boilers().len(), 2);
    assert_eq!(space.objects_of_type(&demo.boiler_type()).len(), 2);

    // Template declarations are untouched.
    assert_ne!(
        space.read_value(&id(ns, ids::BOILER_TEMPERATURE.value)).unwrap(),
        Variant::Double(42.0)
    );
}

#[test]
fn test_duplicate_boiler_id_is_fatal() {
    let (_space, demo) = demo_space();
    boiler(&demo, "Boiler1");
    let err = demo.create_boiler("Boiler1").err().unwrap();
    assert!(matches!(err, ModelError::ConfigurationFatal(_)));
    assert_eq!(demo.boilers().len(), 1);
}

#[test]
fn test_set_points_are_read_only_for_clients() {
    let (space, demo) = demo_space();
    let ns = demo.namespace();
    boiler(&demo, "Boiler1");
    let err = space
        .write_value(&node(ns, "Boiler1.FillLevelSetPoint"), Variant::Double(10.0))
        .unwrap_err();
    assert!(matches!(err, ModelError::AccessDenied(_)));
}

#[test]
fn test_declared_boiler_binds_first_claim() {
    let (space, demo) = demo_space();
    let ns = demo.namespace();
    let tree = declared_boiler(ns, "DeclBoiler", demo.boiler_type())
        .component(declared_variable(ns, "DeclBoiler.ShadowSetPoint", "FillLevelSetPoint"))
        .component(declared_method(ns, "DeclBoiler.Fill", "Fill"))
        .component(declared_method(ns, "DeclBoiler.Heat", "Heat"));
    let (arena, root) = DeclarationArena::from_tree(&tree);
    let object = space
        .create_object_from_declaration(demo.folder(), &arena, root, None)
        .unwrap();

    let instance = object.instance();
    assert_eq!(
        instance.child("FillLevelSetPoint").unwrap().node_id,
        node(ns, "DeclBoiler.FillLevelSetPoint")
    );
    let graph = space.graph().read();
    assert!(!graph.contains(&node(ns, "DeclBoiler.ShadowSetPoint")));
    assert!(graph.contains(&node(ns, "DeclBoiler.TemperatureSensor.Temperature")));
    assert!(graph.contains(&node(ns, "DeclBoiler.Heat.InputArguments")));
    drop(graph);

    // The template's method id addresses the declared method too.
    let heat = instance.method_by_id(&id(ns, ids::BOILER_HEAT)).unwrap();
    assert_eq!(heat.node_id, node(ns, "DeclBoiler.Heat"));
    assert_eq!(demo.boilers().len(), 1);
}

#[test]
fn test_declared_boiler_without_method_is_fatal() {
    let (space, demo) = demo_space();
    let ns = demo.namespace();
    let tree = declared_boiler(ns, "Broken", demo.boiler_type())
        .component(declared_method(ns, "Broken.Fill", "Fill"));
    let (arena, root) = DeclarationArena::from_tree(&tree);
    let err = space
        .create_object_from_declaration(demo.folder(), &arena, root, None)
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::ConfigurationFatal(_)));

    let graph = space.graph().read();
    assert!(!graph.contains(&node(ns, "Broken")));
    assert!(!graph.contains(&node(ns, "Broken.FillLevelSetPoint")));
    drop(graph);
    assert!(space.object(&node(ns, "Broken")).is_none());
}

#[test]
fn test_declared_class_mismatch_is_fatal() {
    let (space, demo) = demo_space();
    let ns = demo.namespace();
    let tree = DeclarationTree::new(Declaration::object(
        node(ns, "Odd"),
        name(ns, "Odd"),
        demo.boiler_type(),
    ))
    .component(DeclarationTree::new(Declaration::object(
        node(ns, "Odd.HeaterStatus"),
        name(ns, "HeaterStatus"),
        builtin::base_object_type(),
    )));
    let (arena, root) = DeclarationArena::from_tree(&tree);
    let err = space
        .create_object_from_declaration(demo.folder(), &arena, root, None)
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::ConfigurationFatal(_)));
    assert!(!space.graph().read().contains(&node(ns, "Odd")));
}

#[test]
fn test_unknown_type_is_unresolved() {
    let (space, demo) = demo_space();
    let ns = demo.namespace();
    let err = space
        .create_object(
            demo.folder(),
            node(ns, "Ghost"),
            name(ns, "Ghost"),
            &id(ns, 9999),
            None,
        )
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::UnresolvedType { .. }));

    let tree = DeclarationTree::new(Declaration::object(
        node(ns, "Ghost"),
        name(ns, "Ghost"),
        id(ns, 9999),
    ));
    let (arena, root) = DeclarationArena::from_tree(&tree);
    let err = space
        .create_object_from_declaration(demo.folder(), &arena, root, None)
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::UnresolvedType { namespace, .. } if namespace == ns));
}

#[test]
fn test_work_order_variable() {
    let (space, demo) = demo_space();
    let ns = demo.namespace();
    let boiler = boiler(&demo, "Boiler1");
    let boiler_lock = boiler.instance().shared_mutex().cloned();
    assert!(boiler_lock.is_some());
    let work_order = demo
        .create_work_order(boiler.node_id(), "WorkOrder", boiler_lock.clone())
        .unwrap();
    assert!(Arc::ptr_eq(
        work_order.shared_mutex().unwrap(),
        boiler_lock.as_ref().unwrap()
    ));

    assert_eq!(work_order.node_id(), &node(ns, "Boiler1.WorkOrder"));
    assert_eq!(work_order.node_class(), NodeClass::Variable);
    let properties: Vec<&str> = work_order
        .children()
        .iter()
        .map(|c| c.browse_name.name.as_ref())
        .collect();
    assert_eq!(properties, vec!["AssetID", "ID", "StartTime"]);

    let graph = space.graph().read();
    assert_eq!(
        graph.type_definition(&node(ns, "Boiler1.WorkOrder")),
        Some(demo.work_order_type())
    );
    assert_eq!(
        graph.parent(&node(ns, "Boiler1.WorkOrder.AssetID")),
        Some((ReferenceKind::HasProperty, node(ns, "Boiler1.WorkOrder")))
    );
}

#[test]
fn test_machine() {
    let (space, demo) = demo_space();
    let ns = demo.namespace();
    let machine = demo.create_machine("Machine1").unwrap();
    assert!(machine.instance().methods().is_empty());
    assert!(machine.instance().child("HeaterSwitch").is_some());
    assert!(space
        .graph()
        .read()
        .contains(&node(ns, "Machine1.TemperatureSensor.Temperature")));

    let switch = node(ns, "Machine1.HeaterSwitch");
    assert_eq!(space.read_value(&switch).unwrap(), Variant::Boolean(false));
    space.write_value(&switch, Variant::Boolean(true)).unwrap();
    assert_eq!(space.read_value(&switch).unwrap(), Variant::Boolean(true));
    // Machines are not boilers.
    assert!(demo.boilers().is_empty());
}
