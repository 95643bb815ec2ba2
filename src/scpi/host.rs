use super::gateway::{Completer, InstrumentHost, ScpiRequest, ScpiResponse};
use ahash::AHashMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A host that parks every request until the caller completes it by hand.
///
/// Clones share the same request list, so one clone can be handed to the engine while
/// another is kept to inspect and answer requests.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    pending: Rc<RefCell<VecDeque<(ScpiRequest, Completer)>>>,
    history: Rc<RefCell<Vec<ScpiRequest>>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request dispatched so far, in order.
    pub fn history(&self) -> Vec<ScpiRequest> {
        self.history.borrow().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Completes the oldest parked request. Returns the request, or `None` if nothing is parked.
    pub fn respond(&self, response: ScpiResponse) -> Option<(ScpiRequest, bool)> {
        let (request, completer) = self.pending.borrow_mut().pop_front()?;
        let accepted = completer.complete(response);
        Some((request, accepted))
    }
}

impl InstrumentHost for RecordingHost {
    fn dispatch(&mut self, request: ScpiRequest, completer: Completer) {
        self.history.borrow_mut().push(request.clone());
        self.pending.borrow_mut().push_back((request, completer));
    }
}

/// A host that answers immediately from a table of canned responses keyed by request text.
///
/// Commands with no table entry are acknowledged with an empty response; queries with
/// no entry fail with an instrument error.
#[derive(Debug, Clone, Default)]
pub struct ScriptedHost {
    responses: AHashMap<String, ScpiResponse>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, text: impl Into<String>, response: ScpiResponse) -> Self {
        self.responses.insert(text.into(), response);
        self
    }
}

impl InstrumentHost for ScriptedHost {
    fn dispatch(&mut self, request: ScpiRequest, completer: Completer) {
        let response = match self.responses.get(&request.text) {
            Some(response) => response.clone(),
            None if request.is_query => {
                ScpiResponse::error(format!("No scripted response for '{}'", request.text))
            }
            None => ScpiResponse::empty(),
        };
        completer.complete(response);
    }
}
