use crate::scpi::{RequestTicket, ScpiExecutionState};
use crate::value::Value;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to one live instantiation of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowStateId(pub u32);

impl fmt::Display for FlowStateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Progress of a `Delay` component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayExecutionState {
    pub wake_at_ms: u64,
}

/// Kind-specific progress of a component that spans more than one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentExecutionState {
    Scpi(ScpiExecutionState),
    Delay(DelayExecutionState),
}

impl ComponentExecutionState {
    /// The gateway ticket owned by this state, if it performs instrument I/O.
    pub fn ticket(&self) -> Option<RequestTicket> {
        match self {
            ComponentExecutionState::Scpi(state) => Some(state.ticket()),
            ComponentExecutionState::Delay(_) => None,
        }
    }
}

/// One instantiation of a flow: its local variables, the execution states of its
/// components and its position in the nesting tree.
#[derive(Debug, Clone)]
pub struct FlowState {
    pub id: FlowStateId,
    pub flow_index: usize,
    pub parent: Option<FlowStateId>,
    /// The `UserWidget` component of the parent that instantiated this state.
    pub parent_component: Option<usize>,
    pub children: Vec<FlowStateId>,
    pub locals: Vec<Value>,
    /// Indexed by component index; `None` while a component is idle.
    pub execution_states: Vec<Option<ComponentExecutionState>>,
    pub timeline_position: f32,
}

impl FlowState {
    pub fn new(
        id: FlowStateId,
        flow_index: usize,
        locals: Vec<Value>,
        component_count: usize,
    ) -> Self {
        Self {
            id,
            flow_index,
            parent: None,
            parent_component: None,
            children: Vec::new(),
            locals,
            execution_states: vec![None; component_count],
            timeline_position: 0.0,
        }
    }

    /// The child instantiated by the given `UserWidget` component, if any.
    pub fn child_for(&self, component: usize, tree: &FlowStateTree) -> Option<FlowStateId> {
        self.children.iter().copied().find(|child| {
            tree.get(*child)
                .is_some_and(|state| state.parent_component == Some(component))
        })
    }

    /// Tickets of every execution state currently held.
    pub fn tickets(&self) -> impl Iterator<Item = RequestTicket> + '_ {
        self.execution_states
            .iter()
            .flatten()
            .filter_map(ComponentExecutionState::ticket)
    }
}

/// Arena of all live flow states, keyed by id.
#[derive(Debug, Default)]
pub struct FlowStateTree {
    states: AHashMap<FlowStateId, FlowState>,
    next_id: u32,
}

impl FlowStateTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_id(&mut self) -> FlowStateId {
        self.next_id += 1;
        FlowStateId(self.next_id)
    }

    /// Inserts `state`, linking it under its parent when it has one.
    pub fn insert(&mut self, state: FlowState) {
        if let Some(parent) = state.parent.and_then(|p| self.states.get_mut(&p)) {
            parent.children.push(state.id);
        }
        self.states.insert(state.id, state);
    }

    pub fn get(&self, id: FlowStateId) -> Option<&FlowState> {
        self.states.get(&id)
    }

    pub fn get_mut(&mut self, id: FlowStateId) -> Option<&mut FlowState> {
        self.states.get_mut(&id)
    }

    pub fn contains(&self, id: FlowStateId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Removes `id` and all of its descendants, children first.
    ///
    /// Returns the removed states; the parent's child list is updated.
    pub fn remove_subtree(&mut self, id: FlowStateId) -> Vec<FlowState> {
        let Some(parent) = self.states.get(&id).map(|s| s.parent) else {
            return Vec::new();
        };
        if let Some(parent) = parent.and_then(|p| self.states.get_mut(&p)) {
            parent.children.retain(|child| *child != id);
        }

        let mut removed = Vec::new();
        let mut stack = vec![id];
        let mut order = Vec::new();
        while let Some(next) = stack.pop() {
            if let Some(state) = self.states.get(&next) {
                stack.extend(state.children.iter().copied());
                order.push(next);
            }
        }
        for next in order.into_iter().rev() {
            if let Some(state) = self.states.remove(&next) {
                removed.push(state);
            }
        }
        removed
    }
}
