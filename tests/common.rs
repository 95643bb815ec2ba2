//! Common test utilities for building flows, engines and UI objects.
use tickflow::bytecode::compiler::{ExpressionAssembler, ScpiAssembler, literal_string, local_ref};
use tickflow::flow::Assignment;
use tickflow::prelude::*;
use tickflow::ui::{HeadlessObject, StyleProperty};

/// Query text used by the single-query fixtures.
#[allow(dead_code)]
pub const VOLTAGE_QUERY: &str = "MEAS:VOLT?";

/// An SCPI component talking to instrument `"dmm"` with no timeout or delay expressions.
#[allow(dead_code)]
pub fn scpi_component(instructions: Vec<u8>) -> ComponentDefinition {
    ComponentDefinition::new(ComponentKind::Scpi(ScpiComponent {
        instrument: literal_string("dmm"),
        timeout: None,
        delay: None,
        instructions,
    }))
}

/// `MEAS:VOLT?` with its result assigned to local #0.
#[allow(dead_code)]
pub fn voltage_query() -> Vec<u8> {
    ScpiAssembler::new()
        .text(VOLTAGE_QUERY)
        .query_into(&local_ref(0))
        .finish()
}

/// A single flow: `Start -> Scpi(instructions) -> SetVariable(local #1 = true)`.
///
/// Local #0 receives query results; local #1 turns `true` once the SCPI component
/// propagated its output.
#[allow(dead_code)]
pub fn scpi_flow(instructions: Vec<u8>) -> FlowAssets {
    let flow = FlowDefinition::new("scpi")
        .with_local(Value::Null)
        .with_local(Value::Null)
        .with_component(ComponentDefinition::new(ComponentKind::Start).then(1))
        .with_component(scpi_component(instructions).then(2))
        .with_component(ComponentDefinition::new(ComponentKind::SetVariable {
            assignments: vec![Assignment {
                target: local_ref(1),
                value: ExpressionAssembler::new().push_bool(true).finish(),
            }],
        }));
    FlowAssets {
        flows: vec![flow],
        globals: vec![Value::from("VOLT")],
    }
}

/// Builds an engine around `assets` and `host`, recording debugger events.
#[allow(dead_code)]
pub fn engine_with(
    assets: FlowAssets,
    host: impl InstrumentHost + 'static,
) -> (FlowEngine, RecordingDebugger) {
    let debugger = RecordingDebugger::new();
    let engine = FlowEngine::builder(assets)
        .with_host(host)
        .with_debugger(debugger.clone())
        .build()
        .expect("default configuration is valid");
    (engine, debugger)
}

/// A UI object with the given geometry and full opacity.
#[allow(dead_code)]
pub fn styled_object(x: i32, y: i32, width: i32, height: i32) -> HeadlessObject {
    let mut object = HeadlessObject::default();
    for (property, value) in [
        (StyleProperty::X, x),
        (StyleProperty::Y, y),
        (StyleProperty::Width, width),
        (StyleProperty::Height, height),
        (StyleProperty::Opacity, 255),
        (StyleProperty::Scale, 256),
        (StyleProperty::Rotation, 0),
    ] {
        object.styles.insert(property, value);
    }
    object
}

#[allow(dead_code)]
pub fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-3,
        "expected {}, got {}",
        expected,
        actual
    );
}
