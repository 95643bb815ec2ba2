//! The tick-driven flow engine.
//!
//! A [`FlowEngine`] owns every live [`FlowState`], the global variables, the
//! [`AsyncIoGateway`], the deferred UI update queue and the active timelines. Each call to
//! [`FlowEngine::tick`] resumes waiting components, runs ready components until they
//! finish or suspend, flushes the update queue and evaluates timelines.

pub mod definition;
pub mod state;

use crate::bytecode::{ExpressionEvaluator, StackVm, Variables};
use crate::config::EngineConfig;
use crate::debugger::{Debugger, DebuggerEvent, LogDebugger};
use crate::error::{ComponentError, ConfigError, DecodeError, EvaluationError};
use crate::scpi::{self, AsyncIoGateway, InstrumentHost, ScpiExecutionState, ScriptedHost};
use crate::timeline::{TimelineKeyframe, TimelineSet, WidgetTimeline};
use crate::ui::{FlushReport, ObjectId, UiSurface, UpdateQueue, UpdateTask};
use crate::value::Value;
use std::collections::VecDeque;

pub use definition::{
    Assignment, ComponentDefinition, ComponentKind, Connection, FlowAssets, FlowDefinition,
};
pub use state::{
    ComponentExecutionState, DelayExecutionState, FlowState, FlowStateId, FlowStateTree,
};

/// What a component execution asks the engine to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Done: drop the execution state and fire the sequence output.
    Finished,
    /// Blocked: keep the execution state and retry next tick.
    Suspended,
    /// Make sure the child state for this `UserWidget` exists, then finish.
    Instantiate { flow: usize },
}

/// Everything a component needs while it runs.
pub(crate) struct ExecContext<'a> {
    pub flow_state: FlowStateId,
    pub component: usize,
    pub evaluator: &'a dyn ExpressionEvaluator,
    pub vars: Variables<'a>,
    pub gateway: &'a mut AsyncIoGateway,
    pub host: &'a mut dyn InstrumentHost,
    pub debugger: &'a mut dyn Debugger,
    pub config: &'a EngineConfig,
}

impl ExecContext<'_> {
    pub fn evaluation_error(&self, source: EvaluationError) -> ComponentError {
        ComponentError::Evaluation {
            flow_state: self.flow_state.0,
            component: self.component,
            source,
        }
    }

    pub fn decode_error(&self, source: DecodeError) -> ComponentError {
        ComponentError::Decode {
            flow_state: self.flow_state.0,
            component: self.component,
            source,
        }
    }

    pub fn instrument_error(&self, message: String) -> ComponentError {
        ComponentError::Instrument {
            flow_state: self.flow_state.0,
            component: self.component,
            message,
        }
    }
}

/// A (flow state, component) pair waiting for its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduledComponent {
    pub flow_state: FlowStateId,
    pub component: usize,
}

/// Summary of one [`FlowEngine::tick`].
#[derive(Debug, Default)]
pub struct TickReport {
    /// Component executions performed.
    pub executed: usize,
    /// Components left waiting for a later tick.
    pub waiting: usize,
    pub updates: FlushReport,
    /// Timelines that wrote new values.
    pub timelines: usize,
}

pub struct FlowEngineBuilder {
    assets: FlowAssets,
    config: EngineConfig,
    evaluator: Option<Box<dyn ExpressionEvaluator>>,
    host: Option<Box<dyn InstrumentHost>>,
    debugger: Option<Box<dyn Debugger>>,
}

impl FlowEngineBuilder {
    pub fn new(assets: FlowAssets) -> Self {
        Self {
            assets,
            config: EngineConfig::default(),
            evaluator: None,
            host: None,
            debugger: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default [`StackVm`] expression evaluator.
    pub fn with_evaluator(mut self, evaluator: impl ExpressionEvaluator + 'static) -> Self {
        self.evaluator = Some(Box::new(evaluator));
        self
    }

    pub fn with_host(mut self, host: impl InstrumentHost + 'static) -> Self {
        self.host = Some(Box::new(host));
        self
    }

    /// Replaces the default [`LogDebugger`] sink.
    pub fn with_debugger(mut self, debugger: impl Debugger + 'static) -> Self {
        self.debugger = Some(Box::new(debugger));
        self
    }

    pub fn build(self) -> Result<FlowEngine, ConfigError> {
        self.config.validate()?;
        Ok(FlowEngine {
            globals: self.assets.globals.clone(),
            assets: self.assets,
            states: FlowStateTree::new(),
            gateway: AsyncIoGateway::new(),
            updates: UpdateQueue::new(),
            timelines: TimelineSet::new(),
            ready: VecDeque::new(),
            waiting: Vec::new(),
            evaluator: self.evaluator.unwrap_or_else(|| Box::new(StackVm)),
            host: self.host.unwrap_or_else(|| Box::new(ScriptedHost::new())),
            debugger: self.debugger.unwrap_or_else(|| Box::new(LogDebugger)),
            config: self.config,
            stopped: false,
            errors: Vec::new(),
            now_ms: 0,
        })
    }
}

pub struct FlowEngine {
    assets: FlowAssets,
    states: FlowStateTree,
    globals: Vec<Value>,
    gateway: AsyncIoGateway,
    updates: UpdateQueue,
    timelines: TimelineSet,
    ready: VecDeque<ScheduledComponent>,
    waiting: Vec<ScheduledComponent>,
    evaluator: Box<dyn ExpressionEvaluator>,
    host: Box<dyn InstrumentHost>,
    debugger: Box<dyn Debugger>,
    config: EngineConfig,
    stopped: bool,
    errors: Vec<ComponentError>,
    now_ms: u64,
}

impl FlowEngine {
    pub fn builder(assets: FlowAssets) -> FlowEngineBuilder {
        FlowEngineBuilder::new(assets)
    }

    pub fn assets(&self) -> &FlowAssets {
        &self.assets
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gateway(&self) -> &AsyncIoGateway {
        &self.gateway
    }

    pub fn updates(&self) -> &UpdateQueue {
        &self.updates
    }

    pub fn timelines(&self) -> &TimelineSet {
        &self.timelines
    }

    pub fn flow_state(&self, id: FlowStateId) -> Option<&FlowState> {
        self.states.get(id)
    }

    pub fn flow_state_count(&self) -> usize {
        self.states.len()
    }

    pub fn execution_state(
        &self,
        flow_state: FlowStateId,
        component: usize,
    ) -> Option<&ComponentExecutionState> {
        self.states
            .get(flow_state)?
            .execution_states
            .get(component)?
            .as_ref()
    }

    /// Whether the component is suspended and will be retried next tick.
    pub fn is_waiting(&self, flow_state: FlowStateId, component: usize) -> bool {
        self.waiting.contains(&ScheduledComponent {
            flow_state,
            component,
        })
    }

    /// Instantiates a top-level flow and schedules its `Start` components.
    pub fn start_flow(&mut self, flow_index: usize) -> Result<FlowStateId, ComponentError> {
        self.create_state(flow_index, None)
    }

    /// Instantiates `flow_index` nested under `parent`, owned by its `parent_component`.
    pub fn start_child_flow(
        &mut self,
        parent: FlowStateId,
        parent_component: usize,
        flow_index: usize,
    ) -> Result<FlowStateId, ComponentError> {
        if !self.states.contains(parent) {
            return Err(ComponentError::UnknownFlowState(parent.0));
        }
        self.create_state(flow_index, Some((parent, parent_component)))
    }

    fn create_state(
        &mut self,
        flow_index: usize,
        parent: Option<(FlowStateId, usize)>,
    ) -> Result<FlowStateId, ComponentError> {
        let flow = self
            .assets
            .flows
            .get(flow_index)
            .ok_or(ComponentError::UnknownFlow(flow_index))?;
        let id = self.states.allocate_id();
        let mut state = FlowState::new(id, flow_index, flow.locals.clone(), flow.components.len());
        state.parent = parent.map(|(p, _)| p);
        state.parent_component = parent.map(|(_, c)| c);

        let starts: Vec<usize> = flow
            .components
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c.kind, ComponentKind::Start))
            .map(|(i, _)| i)
            .collect();
        log::debug!(
            "Created flow state {} for flow '{}' ({} start component(s))",
            id,
            flow.name,
            starts.len()
        );

        self.states.insert(state);
        for component in starts {
            self.schedule(ScheduledComponent {
                flow_state: id,
                component,
            });
        }
        Ok(id)
    }

    /// Tears down a flow state and all of its descendants.
    ///
    /// Gateway slots held by the removed execution states are released, and update
    /// tasks and timelines bound to the removed states are dropped.
    pub fn destroy_flow_state(&mut self, id: FlowStateId) -> bool {
        let removed = self.states.remove_subtree(id);
        if removed.is_empty() {
            return false;
        }
        for state in &removed {
            for ticket in state.tickets() {
                if self.gateway.release(ticket) {
                    log::debug!("Released gateway slot {} held by flow state {}", ticket, state.id);
                }
            }
            let tasks = self.updates.remove_flow_state(state.id);
            self.timelines.remove_flow_state(state.id);
            log::debug!(
                "Destroyed flow state {} (dropped {} update task(s))",
                state.id,
                tasks
            );
        }
        let gone = |sc: &ScheduledComponent| removed.iter().any(|s| s.id == sc.flow_state);
        self.ready.retain(|sc| !gone(sc));
        self.waiting.retain(|sc| !gone(sc));
        true
    }

    /// Stops the engine. Pending and future instrument completions are dropped and
    /// further ticks do nothing.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        log::info!("Stopping flow engine");
        self.stopped = true;
        self.gateway.close();
        self.ready.clear();
        self.waiting.clear();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Runs one tick. `now_ms` is the host's monotonic clock.
    pub fn tick(&mut self, now_ms: u64, ui: &mut dyn UiSurface) -> TickReport {
        let mut report = TickReport::default();
        if self.stopped {
            return report;
        }
        self.now_ms = now_ms;

        // Suspended components get the first chance at the gateway
        let mut queue: VecDeque<ScheduledComponent> = self.waiting.drain(..).collect();
        queue.append(&mut self.ready);
        self.ready = queue;

        while let Some(next) = self.ready.pop_front() {
            if report.executed >= self.config.max_executions_per_tick {
                log::warn!(
                    "Execution limit of {} reached; {} component(s) deferred to the next tick",
                    self.config.max_executions_per_tick,
                    self.ready.len() + 1
                );
                self.ready.push_front(next);
                break;
            }
            report.executed += 1;
            self.run_component(next);
            if self.stopped {
                return report;
            }
        }
        report.waiting = self.waiting.len();

        report.updates = self.flush_updates(ui);

        let FlowEngine {
            states, timelines, ..
        } = self;
        report.timelines =
            timelines.evaluate_all(ui, |id| states.get(id).map(|s| s.timeline_position));

        log::trace!(
            "Tick at {} ms: {} executed, {} waiting, {} UI write(s), {} timeline(s)",
            now_ms,
            report.executed,
            report.waiting,
            report.updates.writes,
            report.timelines
        );
        report
    }

    fn flush_updates(&mut self, ui: &mut dyn UiSurface) -> FlushReport {
        let FlowEngine {
            assets,
            states,
            globals,
            evaluator,
            updates,
            debugger,
            errors,
            ..
        } = self;
        let report = updates.flush(ui, |task| {
            evaluate_property(
                assets,
                states,
                globals,
                &**evaluator,
                task.flow_state,
                task.component,
                task.property,
            )
        });
        for (task, source) in &report.errors {
            let error = ComponentError::Evaluation {
                flow_state: task.flow_state.0,
                component: task.component,
                source: source.clone(),
            };
            debugger.emit(DebuggerEvent::ComponentFailed {
                flow_state: Some(task.flow_state.0),
                message: error.to_string(),
            });
            errors.push(error);
        }
        report
    }

    fn schedule(&mut self, sc: ScheduledComponent) {
        if self.ready.contains(&sc) || self.waiting.contains(&sc) {
            return;
        }
        self.ready.push_back(sc);
    }

    fn run_component(&mut self, sc: ScheduledComponent) {
        let result = self.execute_component(sc).and_then(|step| match step {
            Step::Instantiate { flow } => self.instantiate_child(sc, flow).map(|_| Step::Finished),
            other => Ok(other),
        });
        match result {
            Ok(Step::Suspended) => {
                if !self.waiting.contains(&sc) {
                    self.waiting.push(sc);
                }
            }
            Ok(_) => {
                self.clear_execution_state(sc);
                self.propagate(sc);
            }
            Err(e) => {
                self.clear_execution_state(sc);
                self.report(e);
            }
        }
    }

    fn execute_component(&mut self, sc: ScheduledComponent) -> Result<Step, ComponentError> {
        let FlowEngine {
            assets,
            states,
            globals,
            gateway,
            evaluator,
            host,
            debugger,
            config,
            now_ms,
            ..
        } = self;
        let state = states
            .get_mut(sc.flow_state)
            .ok_or(ComponentError::UnknownFlowState(sc.flow_state.0))?;
        let def = assets
            .flows
            .get(state.flow_index)
            .and_then(|flow| flow.components.get(sc.component))
            .ok_or(ComponentError::UnknownComponent {
                flow_state: sc.flow_state.0,
                component: sc.component,
            })?;
        log::trace!(
            "Executing {} component #{} in flow state {}",
            def.kind.name(),
            sc.component,
            sc.flow_state
        );

        let mut exec = state.execution_states[sc.component].take();
        let mut ctx = ExecContext {
            flow_state: sc.flow_state,
            component: sc.component,
            evaluator: &**evaluator,
            vars: Variables {
                locals: &mut state.locals,
                globals: globals.as_mut_slice(),
            },
            gateway,
            host: &mut **host,
            debugger: &mut **debugger,
            config,
        };

        let step = match &def.kind {
            ComponentKind::Start | ComponentKind::Widget => Ok(Step::Finished),
            ComponentKind::SetVariable { assignments } => {
                set_variables(assignments, &mut ctx).map(|_| Step::Finished)
            }
            ComponentKind::UserWidget { flow } => Ok(Step::Instantiate { flow: *flow }),
            ComponentKind::Scpi(component) => {
                let mut scpi_state = match exec.take() {
                    Some(ComponentExecutionState::Scpi(s)) => s,
                    _ => {
                        let ticket = ctx.gateway.allocate_ticket();
                        log::debug!(
                            "Allocated SCPI execution state {} for component #{} in flow state {}",
                            ticket,
                            sc.component,
                            sc.flow_state
                        );
                        ScpiExecutionState::new(
                            ticket,
                            &component.instructions,
                            ctx.config.command_buffer_capacity,
                        )
                        .map_err(|e| ctx.decode_error(e))?
                    }
                };
                let step = scpi::execute(component, &mut scpi_state, &mut ctx);
                exec = Some(ComponentExecutionState::Scpi(scpi_state));
                step
            }
            ComponentKind::Delay { duration } => {
                let wake_at_ms = match exec.take() {
                    Some(ComponentExecutionState::Delay(d)) => d.wake_at_ms,
                    _ => {
                        let value = ctx
                            .evaluator
                            .eval_expression(&ctx.vars, duration)
                            .map_err(|e| ctx.evaluation_error(e))?
                            .value;
                        let ms = value.to_f64().filter(|ms| !ms.is_nan()).ok_or_else(|| {
                            ctx.evaluation_error(EvaluationError::TypeMismatch {
                                operation: "Delay duration".to_string(),
                                expected: "Number".to_string(),
                                found: value.clone(),
                            })
                        })?;
                        // Float-to-int casts saturate, so huge durations wait "forever"
                        now_ms.saturating_add(ms.max(0.0) as u64)
                    }
                };
                if *now_ms >= wake_at_ms {
                    Ok(Step::Finished)
                } else {
                    exec = Some(ComponentExecutionState::Delay(DelayExecutionState {
                        wake_at_ms,
                    }));
                    Ok(Step::Suspended)
                }
            }
        };
        drop(ctx);
        state.execution_states[sc.component] = exec;
        step
    }

    fn instantiate_child(&mut self, sc: ScheduledComponent, flow: usize) -> Result<(), ComponentError> {
        let existing = self
            .states
            .get(sc.flow_state)
            .and_then(|state| state.child_for(sc.component, &self.states));
        if existing.is_none() {
            self.start_child_flow(sc.flow_state, sc.component, flow)?;
        }
        Ok(())
    }

    fn clear_execution_state(&mut self, sc: ScheduledComponent) {
        let Some(state) = self.states.get_mut(sc.flow_state) else {
            return;
        };
        let Some(exec) = state
            .execution_states
            .get_mut(sc.component)
            .and_then(Option::take)
        else {
            return;
        };
        if let Some(ticket) = exec.ticket() {
            self.gateway.release(ticket);
        }
        log::debug!(
            "Freed execution state of component #{} in flow state {}",
            sc.component,
            sc.flow_state
        );
    }

    /// Schedules every target of the component's sequence output in the same flow state.
    fn propagate(&mut self, sc: ScheduledComponent) {
        let targets: Vec<usize> = self
            .states
            .get(sc.flow_state)
            .and_then(|state| self.assets.flows.get(state.flow_index))
            .and_then(|flow| flow.components.get(sc.component))
            .map(|def| def.sequence_targets().collect())
            .unwrap_or_default();
        for component in targets {
            self.schedule(ScheduledComponent {
                flow_state: sc.flow_state,
                component,
            });
        }
    }

    fn report(&mut self, error: ComponentError) {
        log::error!("{}", error);
        self.debugger.emit(DebuggerEvent::ComponentFailed {
            flow_state: error.flow_state(),
            message: error.to_string(),
        });
        self.errors.push(error);
    }

    /// Takes every component error reported since the last call.
    pub fn drain_errors(&mut self) -> Vec<ComponentError> {
        std::mem::take(&mut self.errors)
    }

    /// Queues a UI update task; nothing is evaluated until the next tick's flush.
    pub fn enqueue_update(&mut self, task: UpdateTask) -> Result<(), ComponentError> {
        if !self.states.contains(task.flow_state) {
            return Err(ComponentError::UnknownFlowState(task.flow_state.0));
        }
        self.updates.enqueue(task);
        Ok(())
    }

    /// Drops every update task and timeline referring to a destroyed UI object.
    pub fn on_object_deleted(&mut self, object: ObjectId) {
        let tasks = self.updates.remove_object(object);
        let timeline = self.timelines.remove_object(object);
        log::debug!(
            "Object {} deleted: dropped {} update task(s){}",
            object,
            tasks,
            if timeline { " and its timeline" } else { "" }
        );
    }

    /// Animates `object` by `keyframes` at the position of `flow_state`.
    pub fn add_timeline(
        &mut self,
        object: ObjectId,
        flow_state: FlowStateId,
        keyframes: Vec<TimelineKeyframe>,
    ) -> Result<(), ComponentError> {
        if !self.states.contains(flow_state) {
            return Err(ComponentError::UnknownFlowState(flow_state.0));
        }
        self.timelines
            .insert(WidgetTimeline::new(object, flow_state, keyframes));
        Ok(())
    }

    pub fn set_timeline_position(
        &mut self,
        flow_state: FlowStateId,
        position: f32,
    ) -> Result<(), ComponentError> {
        let state = self
            .states
            .get_mut(flow_state)
            .ok_or(ComponentError::UnknownFlowState(flow_state.0))?;
        state.timeline_position = position;
        Ok(())
    }

    pub fn global(&self, index: u16) -> Option<&Value> {
        self.globals.get(index as usize)
    }

    pub fn set_global(&mut self, index: u16, value: Value) -> Result<(), EvaluationError> {
        let slot = self
            .globals
            .get_mut(index as usize)
            .ok_or(EvaluationError::UnknownVariable {
                scope: "global",
                index,
            })?;
        *slot = value;
        Ok(())
    }

    pub fn local(&self, flow_state: FlowStateId, index: u16) -> Option<&Value> {
        self.states.get(flow_state)?.locals.get(index as usize)
    }

    /// Evaluates property `property` of `component` in the context of `flow_state`.
    pub fn eval_property(
        &mut self,
        flow_state: FlowStateId,
        component: usize,
        property: usize,
    ) -> Result<Value, EvaluationError> {
        evaluate_property(
            &self.assets,
            &mut self.states,
            &mut self.globals,
            &*self.evaluator,
            flow_state,
            component,
            property,
        )
    }
}

fn evaluate_property(
    assets: &FlowAssets,
    states: &mut FlowStateTree,
    globals: &mut [Value],
    evaluator: &dyn ExpressionEvaluator,
    flow_state: FlowStateId,
    component: usize,
    property: usize,
) -> Result<Value, EvaluationError> {
    let state = states
        .get_mut(flow_state)
        .ok_or(EvaluationError::UnknownFlowState(flow_state.0))?;
    let code = assets
        .flows
        .get(state.flow_index)
        .and_then(|flow| flow.components.get(component))
        .and_then(|def| def.properties.get(property))
        .ok_or(EvaluationError::UnknownProperty {
            component,
            property,
        })?;
    let vars = Variables {
        locals: &mut state.locals,
        globals,
    };
    Ok(evaluator.eval_expression(&vars, code)?.value)
}

fn set_variables(
    assignments: &[Assignment],
    ctx: &mut ExecContext<'_>,
) -> Result<(), ComponentError> {
    for assignment in assignments {
        let value = ctx
            .evaluator
            .eval_expression(&ctx.vars, &assignment.value)
            .map_err(|e| ctx.evaluation_error(e))?
            .value;
        let (target, _) = ctx
            .evaluator
            .eval_assignable(&ctx.vars, &assignment.target)
            .map_err(|e| ctx.evaluation_error(e))?;
        ctx.evaluator
            .assign_value(&mut ctx.vars, target, value)
            .map_err(|e| ctx.evaluation_error(e))?;
    }
    Ok(())
}
