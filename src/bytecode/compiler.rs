use crate::bytecode::opcode::{ExprOp, ScpiOp};

/// Builds an encoded expression for the reference evaluator.
///
/// Operations are appended in postfix order:
///
/// ```rust
/// use tickflow::bytecode::compiler::ExpressionAssembler;
/// use tickflow::bytecode::opcode::ExprOp;
///
/// // $global0 + 1
/// let code = ExpressionAssembler::new()
///     .load_global(0)
///     .push_int(1)
///     .op(ExprOp::Add)
///     .finish();
/// assert_eq!(code.last(), Some(&(ExprOp::End as u8)));
/// ```
#[derive(Debug, Default, Clone)]
pub struct ExpressionAssembler {
    code: Vec<u8>,
}

impl ExpressionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_null(mut self) -> Self {
        self.code.push(ExprOp::PushNull as u8);
        self
    }

    pub fn push_bool(mut self, value: bool) -> Self {
        self.code.push(ExprOp::PushBool as u8);
        self.code.push(value as u8);
        self
    }

    pub fn push_int(mut self, value: i32) -> Self {
        self.code.push(ExprOp::PushInt as u8);
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn push_number(mut self, value: f64) -> Self {
        self.code.push(ExprOp::PushNumber as u8);
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn push_string(mut self, value: &str) -> Self {
        self.code.push(ExprOp::PushString as u8);
        push_length_prefixed(&mut self.code, value.as_bytes());
        self
    }

    pub fn load_local(mut self, index: u16) -> Self {
        self.code.push(ExprOp::LoadLocal as u8);
        self.code.extend_from_slice(&index.to_le_bytes());
        self
    }

    pub fn load_global(mut self, index: u16) -> Self {
        self.code.push(ExprOp::LoadGlobal as u8);
        self.code.extend_from_slice(&index.to_le_bytes());
        self
    }

    /// Appends an operand-less operator.
    pub fn op(mut self, op: ExprOp) -> Self {
        self.code.push(op as u8);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.code.push(ExprOp::End as u8);
        self.code
    }
}

/// Shorthand for a single-literal expression.
pub fn literal_int(value: i32) -> Vec<u8> {
    ExpressionAssembler::new().push_int(value).finish()
}

pub fn literal_string(value: &str) -> Vec<u8> {
    ExpressionAssembler::new().push_string(value).finish()
}

pub fn local_ref(index: u16) -> Vec<u8> {
    ExpressionAssembler::new().load_local(index).finish()
}

pub fn global_ref(index: u16) -> Vec<u8> {
    ExpressionAssembler::new().load_global(index).finish()
}

/// Builds the instruction stream of an SCPI component.
#[derive(Debug, Default, Clone)]
pub struct ScpiAssembler {
    code: Vec<u8>,
}

impl ScpiAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, literal: &str) -> Self {
        self.code.push(ScpiOp::AppendString as u8);
        push_length_prefixed(&mut self.code, literal.as_bytes());
        self
    }

    pub fn expr(mut self, expression: &[u8]) -> Self {
        self.code.push(ScpiOp::AppendExpression as u8);
        self.code.extend_from_slice(expression);
        self
    }

    pub fn query_into(mut self, assignable: &[u8]) -> Self {
        self.code.push(ScpiOp::QueryWithAssignment as u8);
        self.code.extend_from_slice(assignable);
        self
    }

    pub fn query(mut self) -> Self {
        self.code.push(ScpiOp::Query as u8);
        self
    }

    pub fn command(mut self) -> Self {
        self.code.push(ScpiOp::Command as u8);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.code.push(ScpiOp::End as u8);
        self.code
    }
}

fn push_length_prefixed(code: &mut Vec<u8>, bytes: &[u8]) {
    // Literals longer than the prefix can address are cut at the limit
    let len = bytes.len().min(u16::MAX as usize);
    code.extend_from_slice(&(len as u16).to_le_bytes());
    code.extend_from_slice(&bytes[..len]);
}
