use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identity of one SCPI execution state inside the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestTicket(pub u64);

impl fmt::Display for RequestTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A command or query handed to the instrument host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScpiRequest {
    pub ticket: RequestTicket,
    pub instrument: Value,
    pub text: String,
    pub is_query: bool,
    /// Advisory only; a negative value selects the host default.
    pub timeout_ms: i32,
    /// Advisory only; a negative value selects the host default.
    pub delay_ms: i32,
}

/// The completed result of a request as delivered by the host.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScpiResponse {
    pub error: Option<String>,
    pub payload: Vec<u8>,
    pub is_blob: bool,
}

impl ScpiResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            error: None,
            payload: text.into().into_bytes(),
            is_blob: false,
        }
    }

    pub fn blob(bytes: Vec<u8>) -> Self {
        Self {
            error: None,
            payload: bytes,
            is_blob: true,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            payload: Vec::new(),
            is_blob: false,
        }
    }

    /// A command acknowledgement carrying no payload.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// The host side of the asynchronous I/O boundary.
///
/// `dispatch` is fire-and-forget: the host performs the I/O however it likes and later
/// calls [`Completer::complete`], possibly from another thread, possibly before
/// `dispatch` even returns.
pub trait InstrumentHost {
    fn dispatch(&mut self, request: ScpiRequest, completer: Completer);
}

/// Observable result of trying to issue a request through the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum IoStatus {
    /// The slot is held by another request, or by this one without a result yet.
    NotReady,
    /// This caller's own request has completed; the slot has been released.
    Ready(ScpiResponse),
    /// A new request was accepted and handed to the host.
    Queued,
}

#[derive(Debug)]
struct Pending {
    ticket: RequestTicket,
    response: Option<ScpiResponse>,
}

#[derive(Debug, Default)]
struct Slot {
    closed: bool,
    pending: Option<Pending>,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One-shot handle through which the host delivers a response.
///
/// Consuming `self` on completion makes each response a single write.
#[derive(Debug)]
pub struct Completer {
    ticket: RequestTicket,
    slot: Arc<Mutex<Slot>>,
}

impl Completer {
    pub fn ticket(&self) -> RequestTicket {
        self.ticket
    }

    /// Stores the response for the waiting component.
    ///
    /// Returns `false` when the response was dropped: the gateway is closed, or the
    /// request no longer owns the slot because its flow state was torn down.
    pub fn complete(self, response: ScpiResponse) -> bool {
        let mut slot = lock(&self.slot);
        if slot.closed {
            log::debug!("Dropping completion for {}: flow is stopped", self.ticket);
            return false;
        }
        match slot.pending.as_mut() {
            Some(pending) if pending.ticket == self.ticket && pending.response.is_none() => {
                log::debug!("Request {} completed", self.ticket);
                pending.response = Some(response);
                true
            }
            _ => {
                log::warn!(
                    "Dropping completion for {}: request no longer pending",
                    self.ticket
                );
                false
            }
        }
    }
}

/// Serializes all instrument I/O through a single pending-request slot.
///
/// At most one request is outstanding at any instant. The slot is keyed by the
/// issuing execution state's ticket; callers poll by re-issuing every tick.
#[derive(Debug)]
pub struct AsyncIoGateway {
    slot: Arc<Mutex<Slot>>,
    next_ticket: u64,
}

impl Default for AsyncIoGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncIoGateway {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::default())),
            next_ticket: 1,
        }
    }

    pub fn allocate_ticket(&mut self) -> RequestTicket {
        let ticket = RequestTicket(self.next_ticket);
        self.next_ticket += 1;
        ticket
    }

    /// Issues (or polls) the request identified by `ticket`.
    ///
    /// `build` runs only when the slot is vacant and the request is actually going to be
    /// dispatched; if it fails the slot is released again and its error is returned.
    pub fn issue<E, F>(
        &self,
        ticket: RequestTicket,
        host: &mut dyn InstrumentHost,
        build: F,
    ) -> Result<IoStatus, E>
    where
        F: FnOnce() -> Result<ScpiRequest, E>,
    {
        {
            let mut slot = lock(&self.slot);
            if slot.closed {
                return Ok(IoStatus::NotReady);
            }
            match slot.pending.as_mut() {
                None => {
                    slot.pending = Some(Pending {
                        ticket,
                        response: None,
                    });
                }
                Some(pending) if pending.ticket == ticket && pending.response.is_some() => {
                    let response = pending.response.take().unwrap_or_default();
                    slot.pending = None;
                    return Ok(IoStatus::Ready(response));
                }
                Some(_) => return Ok(IoStatus::NotReady),
            }
        }

        // The lock is released here: hosts may complete synchronously from `dispatch`.
        let request = match build() {
            Ok(request) => request,
            Err(e) => {
                self.release(ticket);
                return Err(e);
            }
        };
        let completer = Completer {
            ticket,
            slot: Arc::clone(&self.slot),
        };
        host.dispatch(request, completer);
        Ok(IoStatus::Queued)
    }

    /// Frees the slot if `ticket` owns it. Returns whether anything was released.
    pub fn release(&self, ticket: RequestTicket) -> bool {
        let mut slot = lock(&self.slot);
        match &slot.pending {
            Some(pending) if pending.ticket == ticket => {
                slot.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn owner(&self) -> Option<RequestTicket> {
        lock(&self.slot).pending.as_ref().map(|p| p.ticket)
    }

    pub fn is_busy(&self) -> bool {
        self.owner().is_some()
    }

    /// Drops any pending request and rejects all further completions and issues.
    pub fn close(&self) {
        let mut slot = lock(&self.slot);
        slot.closed = true;
        slot.pending = None;
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.slot).closed
    }
}
