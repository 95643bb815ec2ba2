use tickflow::bytecode::compiler::global_ref;
use tickflow::flow::FlowStateId;
use tickflow::prelude::*;
use tickflow::ui::{ObjectState, TaskLifetime, UpdateQueue};

const SLIDER: ObjectId = ObjectId(1);
const LABEL: ObjectId = ObjectId(2);
const CHECKBOX: ObjectId = ObjectId(3);

/// One passive widget whose properties read globals #0 (number), #1 (text) and #2 (flag).
fn widget_assets() -> FlowAssets {
    let widget = ComponentDefinition::new(ComponentKind::Widget)
        .with_property(global_ref(0))
        .with_property(global_ref(1))
        .with_property(global_ref(2));
    FlowAssets {
        flows: vec![FlowDefinition::new("page").with_component(widget)],
        globals: vec![Value::Integer(5), Value::from("ready"), Value::Bool(true)],
    }
}

fn engine() -> (FlowEngine, FlowStateId) {
    let mut engine = FlowEngine::builder(widget_assets()).build().unwrap();
    let page = engine.start_flow(0).unwrap();
    (engine, page)
}

#[test]
fn test_flush_writes_only_changed_values() {
    let (mut engine, page) = engine();
    let mut ui = HeadlessUi::new();
    engine
        .enqueue_update(UpdateTask::new(UpdateKind::SliderValue, SLIDER, page, 0, 0))
        .unwrap();
    engine
        .enqueue_update(UpdateTask::new(UpdateKind::Text, LABEL, page, 0, 1))
        .unwrap();

    let report = engine.tick(0, &mut ui);
    assert_eq!(report.updates.evaluated, 2);
    assert_eq!(report.updates.writes, 2);
    assert_eq!(ui.writes(), 2);
    assert_eq!(ui.object(SLIDER).map(|o| o.slider), Some(5));
    assert_eq!(ui.text(LABEL), Some("ready".to_string()));

    // Same values: evaluated again, written never
    let report = engine.tick(16, &mut ui);
    assert_eq!(report.updates.evaluated, 2);
    assert_eq!(report.updates.writes, 0);
    assert_eq!(ui.writes(), 2);

    engine.set_global(0, Value::Number(7.4)).unwrap();
    let report = engine.tick(32, &mut ui);
    assert_eq!(report.updates.writes, 1);
    assert_eq!(ui.object(SLIDER).map(|o| o.slider), Some(7));
}

#[test]
fn test_once_tasks_are_dropped_after_flush() {
    let (mut engine, page) = engine();
    let mut ui = HeadlessUi::new();
    engine
        .enqueue_update(UpdateTask::new(UpdateKind::Checked, CHECKBOX, page, 0, 2).once())
        .unwrap();
    engine
        .enqueue_update(UpdateTask::new(UpdateKind::Text, LABEL, page, 0, 1))
        .unwrap();

    engine.tick(0, &mut ui);
    assert!(ui.has_state(CHECKBOX, ObjectState::Checked));
    assert_eq!(engine.updates().len(), 1);
    assert_eq!(engine.updates().tasks()[0].lifetime, TaskLifetime::EveryTick);
}

#[test]
fn test_deleted_object_is_pruned_before_flush() {
    let (mut engine, page) = engine();
    let mut ui = HeadlessUi::new();
    engine
        .enqueue_update(UpdateTask::new(UpdateKind::SliderValue, SLIDER, page, 0, 0))
        .unwrap();
    engine
        .enqueue_update(UpdateTask::new(UpdateKind::Text, LABEL, page, 0, 1).with_subobject(SLIDER))
        .unwrap();
    engine
        .enqueue_update(UpdateTask::new(UpdateKind::Hidden, CHECKBOX, page, 0, 2))
        .unwrap();

    engine.on_object_deleted(SLIDER);
    ui.remove(SLIDER);
    assert_eq!(engine.updates().len(), 1);

    engine.tick(0, &mut ui);
    assert!(ui.object(SLIDER).is_none(), "a pruned task must not touch the object");
    assert_eq!(ui.object(CHECKBOX).map(|o| o.hidden), Some(true));
}

#[test]
fn test_failing_task_does_not_block_the_rest() {
    let (mut engine, page) = engine();
    let mut ui = HeadlessUi::new();
    engine
        .enqueue_update(UpdateTask::new(UpdateKind::BarValue, SLIDER, page, 0, 9))
        .unwrap();
    engine
        .enqueue_update(UpdateTask::new(UpdateKind::ArcValue, SLIDER, page, 0, 1))
        .unwrap();
    engine
        .enqueue_update(UpdateTask::new(UpdateKind::Text, LABEL, page, 0, 1))
        .unwrap();

    let report = engine.tick(0, &mut ui);
    assert_eq!(report.updates.errors.len(), 2);
    assert!(matches!(
        report.updates.errors[0].1,
        EvaluationError::UnknownProperty { component: 0, property: 9 }
    ));
    assert!(matches!(
        report.updates.errors[1].1,
        EvaluationError::TypeMismatch { .. }
    ));
    assert_eq!(ui.text(LABEL), Some("ready".to_string()));
    assert_eq!(engine.drain_errors().len(), 2);
}

#[test]
fn test_persistent_failure_is_reported_once() {
    let (mut engine, page) = engine();
    let mut ui = HeadlessUi::new();
    engine
        .enqueue_update(UpdateTask::new(UpdateKind::BarValue, SLIDER, page, 0, 9))
        .unwrap();
    engine
        .enqueue_update(UpdateTask::new(UpdateKind::ArcValue, SLIDER, page, 0, 1))
        .unwrap();

    let report = engine.tick(0, &mut ui);
    assert_eq!(report.updates.errors.len(), 2);
    assert_eq!(report.updates.repeated_failures, 0);
    assert_eq!(engine.drain_errors().len(), 2);

    // Still failing: counted, not reported again
    for now in [16, 32, 48] {
        let report = engine.tick(now, &mut ui);
        assert!(report.updates.errors.is_empty());
        assert_eq!(report.updates.repeated_failures, 2);
    }
    assert!(engine.drain_errors().is_empty());
    assert!(engine.updates().tasks().iter().all(|t| t.is_failing()));

    // Arc binding recovers once the text turns numeric
    engine.set_global(1, Value::Integer(3)).unwrap();
    let report = engine.tick(64, &mut ui);
    assert!(report.updates.errors.is_empty());
    assert_eq!(report.updates.repeated_failures, 1);
    assert_eq!(report.updates.writes, 1);
    assert!(!engine.updates().tasks()[1].is_failing());

    // A fresh failure after recovery is reported again
    engine.set_global(1, Value::from("ready")).unwrap();
    let report = engine.tick(80, &mut ui);
    assert_eq!(report.updates.errors.len(), 1);
    assert!(matches!(
        report.updates.errors[0].1,
        EvaluationError::TypeMismatch { .. }
    ));
    assert_eq!(engine.drain_errors().len(), 1);
}

#[test]
fn test_destroyed_flow_state_drops_its_tasks() {
    let (mut engine, page) = engine();
    engine
        .enqueue_update(UpdateTask::new(UpdateKind::Text, LABEL, page, 0, 1))
        .unwrap();

    engine.destroy_flow_state(page);
    assert!(engine.updates().is_empty());
    assert!(matches!(
        engine.enqueue_update(UpdateTask::new(UpdateKind::Text, LABEL, page, 0, 1)),
        Err(ComponentError::UnknownFlowState(_))
    ));
}

#[test]
fn test_queue_flush_in_insertion_order() {
    let mut queue = UpdateQueue::new();
    let page = FlowStateId(1);
    queue.enqueue(UpdateTask::new(UpdateKind::Text, LABEL, page, 0, 0).once());
    queue.enqueue(UpdateTask::new(UpdateKind::Text, LABEL, page, 0, 1).once());
    let mut ui = HeadlessUi::new();

    let mut order = Vec::new();
    let report = queue.flush(&mut ui, |task| {
        order.push(task.property);
        Ok(Value::Integer(task.property as i32))
    });

    assert_eq!(order, vec![0, 1]);
    assert_eq!(report.writes, 2);
    assert_eq!(ui.text(LABEL), Some("1".to_string()));
    assert!(queue.is_empty());
}

#[test]
fn test_bar_animation_parameter() {
    let mut queue = UpdateQueue::new();
    let task = UpdateTask::new(UpdateKind::BarValue, SLIDER, FlowStateId(1), 0, 0).with_param(1);
    assert_eq!(task.param, Some(1));
    queue.enqueue(task);
    let mut ui = HeadlessUi::new();

    let report = queue.flush(&mut ui, |_| Ok(Value::from("40")));
    assert_eq!(report.writes, 1);
    assert_eq!(ui.object(SLIDER).map(|o| o.bar), Some(40));

    let report = queue.flush(&mut ui, |_| Ok(Value::Integer(40)));
    assert_eq!(report.writes, 0);
    assert_eq!(ui.writes(), 1);
}
