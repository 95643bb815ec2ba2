use super::{ObjectFlag, ObjectId, ObjectState, UiSurface};
use crate::error::EvaluationError;
use crate::flow::FlowStateId;
use crate::value::Value;

/// Which UI property a task writes, and through which getter/setter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Text,
    SliderValue,
    BarValue,
    ArcValue,
    Checked,
    Disabled,
    Hidden,
    Clickable,
}

/// Whether a task survives its flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskLifetime {
    /// Applied at the next flush, then dropped.
    Once,
    /// A property binding re-evaluated on every flush.
    #[default]
    EveryTick,
}

/// A deferred "evaluate flow property, apply to UI object" operation.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateTask {
    pub kind: UpdateKind,
    pub object: ObjectId,
    pub flow_state: FlowStateId,
    pub component: usize,
    pub property: usize,
    /// When set, the value is written to this object instead of `object`.
    pub subobject: Option<ObjectId>,
    /// Kind-specific integer argument; for slider and bar values a non-zero value animates.
    pub param: Option<i32>,
    pub lifetime: TaskLifetime,
    /// Set while the bound property keeps failing, so the failure is reported once.
    failing: bool,
}

impl UpdateTask {
    pub fn new(
        kind: UpdateKind,
        object: ObjectId,
        flow_state: FlowStateId,
        component: usize,
        property: usize,
    ) -> Self {
        Self {
            kind,
            object,
            flow_state,
            component,
            property,
            subobject: None,
            param: None,
            lifetime: TaskLifetime::EveryTick,
            failing: false,
        }
    }

    pub fn with_subobject(mut self, subobject: ObjectId) -> Self {
        self.subobject = Some(subobject);
        self
    }

    pub fn with_param(mut self, param: i32) -> Self {
        self.param = Some(param);
        self
    }

    pub fn once(mut self) -> Self {
        self.lifetime = TaskLifetime::Once;
        self
    }

    /// Whether the last flush of this task failed.
    pub fn is_failing(&self) -> bool {
        self.failing
    }

    pub fn target(&self) -> ObjectId {
        self.subobject.unwrap_or(self.object)
    }

    fn references(&self, object: ObjectId) -> bool {
        self.object == object || self.subobject == Some(object)
    }

    fn animate(&self) -> bool {
        self.param.unwrap_or(0) != 0
    }

    /// Writes `value` if it differs from the current UI value. Returns whether a write happened.
    fn apply(&self, ui: &mut dyn UiSurface, value: &Value) -> Result<bool, EvaluationError> {
        let target = self.target();
        let written = match self.kind {
            UpdateKind::Text => {
                let text = value.to_string();
                let changed = ui.text(target).as_deref() != Some(text.as_str());
                if changed {
                    ui.set_text(target, &text);
                }
                changed
            }
            UpdateKind::SliderValue => {
                let new = self.numeric(value)?;
                let changed = ui.slider_value(target) != new;
                if changed {
                    ui.set_slider_value(target, new, self.animate());
                }
                changed
            }
            UpdateKind::BarValue => {
                let new = self.numeric(value)?;
                let changed = ui.bar_value(target) != new;
                if changed {
                    ui.set_bar_value(target, new, self.animate());
                }
                changed
            }
            UpdateKind::ArcValue => {
                let new = self.numeric(value)?;
                let changed = ui.arc_value(target) != new;
                if changed {
                    ui.set_arc_value(target, new);
                }
                changed
            }
            UpdateKind::Checked => apply_state(ui, target, ObjectState::Checked, value.to_bool()),
            UpdateKind::Disabled => {
                apply_state(ui, target, ObjectState::Disabled, value.to_bool())
            }
            UpdateKind::Hidden => apply_flag(ui, target, ObjectFlag::Hidden, value.to_bool()),
            UpdateKind::Clickable => {
                apply_flag(ui, target, ObjectFlag::Clickable, value.to_bool())
            }
        };
        Ok(written)
    }

    fn numeric(&self, value: &Value) -> Result<i32, EvaluationError> {
        value.to_i32().ok_or_else(|| EvaluationError::TypeMismatch {
            operation: format!("{:?} update", self.kind),
            expected: "Number".to_string(),
            found: value.clone(),
        })
    }
}

fn apply_state(ui: &mut dyn UiSurface, target: ObjectId, state: ObjectState, on: bool) -> bool {
    let changed = ui.has_state(target, state) != on;
    if changed {
        ui.set_state(target, state, on);
    }
    changed
}

fn apply_flag(ui: &mut dyn UiSurface, target: ObjectId, flag: ObjectFlag, on: bool) -> bool {
    let changed = ui.has_flag(target, flag) != on;
    if changed {
        ui.set_flag(target, flag, on);
    }
    changed
}

/// Outcome of one [`UpdateQueue::flush`].
#[derive(Debug, Default)]
pub struct FlushReport {
    pub evaluated: usize,
    pub writes: usize,
    /// Newly failing tasks.
    pub errors: Vec<(UpdateTask, EvaluationError)>,
    /// Tasks that failed again after already being reported.
    pub repeated_failures: usize,
}

/// Insertion-ordered queue of update tasks, flushed once per tick.
#[derive(Debug, Default, Clone)]
pub struct UpdateQueue {
    tasks: Vec<UpdateTask>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task. Nothing is evaluated until the next flush.
    pub fn enqueue(&mut self, task: UpdateTask) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[UpdateTask] {
        &self.tasks
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Drops every task that writes to or through `object`.
    pub fn remove_object(&mut self, object: ObjectId) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|task| !task.references(object));
        before - self.tasks.len()
    }

    pub fn remove_flow_state(&mut self, flow_state: FlowStateId) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.flow_state != flow_state);
        before - self.tasks.len()
    }

    /// Evaluates each task's bound property in insertion order and writes changed values.
    ///
    /// A task whose evaluation fails is skipped; the rest still run. A failure is
    /// reported on the first failing flush only and counted in `repeated_failures` until
    /// the task succeeds again. `Once` tasks are dropped afterwards.
    pub fn flush<F>(&mut self, ui: &mut dyn UiSurface, mut eval_property: F) -> FlushReport
    where
        F: FnMut(&UpdateTask) -> Result<Value, EvaluationError>,
    {
        let mut report = FlushReport::default();
        for task in &mut self.tasks {
            report.evaluated += 1;
            let applied = eval_property(&*task).and_then(|value| task.apply(ui, &value));
            match applied {
                Ok(written) => {
                    task.failing = false;
                    if written {
                        report.writes += 1;
                    }
                }
                Err(e) if task.failing => {
                    log::trace!("Update of {} still failing: {}", task.target(), e);
                    report.repeated_failures += 1;
                }
                Err(e) => {
                    log::warn!(
                        "Update of {} ({:?}) from component #{} property #{} failed: {}",
                        task.target(),
                        task.kind,
                        task.component,
                        task.property,
                        e
                    );
                    task.failing = true;
                    report.errors.push((task.clone(), e));
                }
            }
        }
        self.tasks
            .retain(|task| task.lifetime == TaskLifetime::EveryTick);
        report
    }
}
