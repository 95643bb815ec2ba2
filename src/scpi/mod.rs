//! The SCPI instrument component: builds command text from its instruction stream,
//! issues it through the [`AsyncIoGateway`] and resumes across ticks until done.

pub mod gateway;
pub mod host;
pub mod response;

use crate::bytecode::opcode::ScpiOp;
use crate::bytecode::{ExpressionEvaluator, InstructionCursor, Variables};
use crate::debugger::DebuggerEvent;
use crate::error::{ComponentError, EvaluationError};
use crate::flow::{ExecContext, Step};
use serde::{Deserialize, Serialize};

pub use gateway::{
    AsyncIoGateway, Completer, InstrumentHost, IoStatus, RequestTicket, ScpiRequest, ScpiResponse,
};
pub use host::{RecordingHost, ScriptedHost};
pub use response::{escape_quoted, parse_response, parse_text, unescape_quoted};

/// Static configuration of an SCPI component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScpiComponent {
    /// Expression yielding the instrument handle.
    pub instrument: Vec<u8>,
    #[serde(default)]
    pub timeout: Option<Vec<u8>>,
    #[serde(default)]
    pub delay: Option<Vec<u8>>,
    pub instructions: Vec<u8>,
}

/// Bounded command text; appends past the capacity are cut at a character boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandBuffer {
    text: String,
    capacity: usize,
}

impl CommandBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            text: String::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends as much of `s` as fits. Returns `false` if anything was cut.
    pub fn push_str(&mut self, s: &str) -> bool {
        let room = self.capacity.saturating_sub(self.text.len());
        if s.len() <= room {
            self.text.push_str(s);
            return true;
        }
        let mut end = room;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.text.push_str(&s[..end]);
        false
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Per-(flow state, component) progress through the instruction stream.
///
/// `op` is the opcode being executed and `cursor` the offset of its operands, so a
/// suspended component re-enters exactly where it stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct ScpiExecutionState {
    ticket: RequestTicket,
    op: ScpiOp,
    cursor: usize,
    command: CommandBuffer,
}

impl ScpiExecutionState {
    pub fn new(
        ticket: RequestTicket,
        instructions: &[u8],
        capacity: usize,
    ) -> Result<Self, crate::error::DecodeError> {
        let mut cursor = InstructionCursor::new(instructions);
        let op = ScpiOp::decode(cursor.read_u8()?, 0)?;
        Ok(Self {
            ticket,
            op,
            cursor: cursor.offset(),
            command: CommandBuffer::new(capacity),
        })
    }

    pub fn ticket(&self) -> RequestTicket {
        self.ticket
    }

    pub fn op(&self) -> ScpiOp {
        self.op
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn command(&self) -> &str {
        self.command.as_str()
    }

    fn fetch_next(&mut self, instructions: &[u8]) -> Result<(), crate::error::DecodeError> {
        let mut cursor = InstructionCursor::at(instructions, self.cursor);
        let offset = cursor.offset();
        self.op = ScpiOp::decode(cursor.read_u8()?, offset)?;
        self.cursor = cursor.offset();
        Ok(())
    }

    fn append(&mut self, text: &str) {
        if !self.command.push_str(text) {
            log::warn!(
                "SCPI command text truncated to {} bytes: '{}'",
                self.command.len(),
                self.command.as_str()
            );
        }
    }
}

fn eval_i32(
    evaluator: &dyn ExpressionEvaluator,
    vars: &Variables<'_>,
    code: Option<&Vec<u8>>,
    default: i32,
) -> Result<i32, EvaluationError> {
    let Some(code) = code else {
        return Ok(default);
    };
    let value = evaluator.eval_expression(vars, code)?.value;
    value.to_i32().ok_or_else(|| EvaluationError::TypeMismatch {
        operation: "SCPI timeout/delay".to_string(),
        expected: "Integer".to_string(),
        found: value,
    })
}

/// Runs the component until it blocks on the gateway or reaches `End`.
pub(crate) fn execute(
    def: &ScpiComponent,
    state: &mut ScpiExecutionState,
    ctx: &mut ExecContext<'_>,
) -> Result<Step, ComponentError> {
    let code = def.instructions.as_slice();
    loop {
        log::trace!(
            "SCPI component #{} at offset {}: {:?}",
            ctx.component,
            state.cursor,
            state.op
        );
        match state.op {
            ScpiOp::AppendString => {
                let mut cursor = InstructionCursor::at(code, state.cursor);
                let literal = cursor.read_str().map_err(|e| ctx.decode_error(e))?;
                state.append(literal);
                state.cursor = cursor.offset();
            }
            ScpiOp::AppendExpression => {
                let operand = InstructionCursor::at(code, state.cursor).rest();
                let evaluated = ctx
                    .evaluator
                    .eval_expression(&ctx.vars, operand)
                    .map_err(|e| ctx.evaluation_error(e))?;
                state.append(&evaluated.value.to_string());
                state.cursor += evaluated.consumed;
            }
            ScpiOp::QueryWithAssignment | ScpiOp::Query | ScpiOp::Command => {
                let is_query = state.op != ScpiOp::Command;
                let status = issue(def, state, is_query, ctx)?;
                let response = match status {
                    IoStatus::Ready(response) => response,
                    IoStatus::Queued => {
                        ctx.debugger.emit(DebuggerEvent::ScpiIssued {
                            flow_state: ctx.flow_state.0,
                            component: ctx.component,
                            text: state.command().to_string(),
                            is_query,
                        });
                        return Ok(Step::Suspended);
                    }
                    IoStatus::NotReady => return Ok(Step::Suspended),
                };

                if let Some(message) = &response.error {
                    ctx.debugger.emit(DebuggerEvent::ScpiCompleted {
                        flow_state: ctx.flow_state.0,
                        component: ctx.component,
                        error: Some(message.clone()),
                        result: None,
                    });
                    return Err(ctx.instrument_error(message.clone()));
                }

                let value = response::parse_response(&response);
                ctx.debugger.emit(DebuggerEvent::ScpiCompleted {
                    flow_state: ctx.flow_state.0,
                    component: ctx.component,
                    error: None,
                    result: is_query.then(|| value.to_string()),
                });

                if state.op == ScpiOp::QueryWithAssignment {
                    let operand = InstructionCursor::at(code, state.cursor).rest();
                    let (target, width) = ctx
                        .evaluator
                        .eval_assignable(&ctx.vars, operand)
                        .map_err(|e| ctx.evaluation_error(e))?;
                    ctx.evaluator
                        .assign_value(&mut ctx.vars, target, value)
                        .map_err(|e| ctx.evaluation_error(e))?;
                    state.cursor += width;
                }
                state.command.clear();
            }
            ScpiOp::End => return Ok(Step::Finished),
        }
        state.fetch_next(code).map_err(|e| ctx.decode_error(e))?;
    }
}

fn issue(
    def: &ScpiComponent,
    state: &ScpiExecutionState,
    is_query: bool,
    ctx: &mut ExecContext<'_>,
) -> Result<IoStatus, ComponentError> {
    let evaluator = ctx.evaluator;
    let vars = &ctx.vars;
    let config = ctx.config;
    let host = &mut *ctx.host;
    let ticket = state.ticket;
    let text = state.command();

    let status = ctx.gateway.issue(ticket, host, || -> Result<_, EvaluationError> {
        let instrument = evaluator.eval_expression(vars, &def.instrument)?.value;
        let timeout_ms = eval_i32(
            evaluator,
            vars,
            def.timeout.as_ref(),
            config.default_timeout_ms,
        )?;
        let delay_ms = eval_i32(evaluator, vars, def.delay.as_ref(), config.default_delay_ms)?;
        log::debug!(
            "Issuing SCPI {} {} '{}' to {}",
            if is_query { "query" } else { "command" },
            ticket,
            text,
            instrument
        );
        Ok(ScpiRequest {
            ticket,
            instrument,
            text: text.to_string(),
            is_query,
            timeout_ms,
            delay_ms,
        })
    });
    status.map_err(|e| ctx.evaluation_error(e))
}
