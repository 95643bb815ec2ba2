use super::{AssignTarget, Evaluated, ExpressionEvaluator, InstructionCursor, Variables};
use crate::bytecode::opcode::ExprOp;
use crate::error::EvaluationError;
use crate::value::Value;

/// Initial stack capacity; expressions embedded in components are shallow.
const STACK_CAPACITY: usize = 16;

macro_rules! arithmetic_op {
    ($self:ident, $stack:ident, $op_str:expr, $int_op:ident, $float_op:tt) => {{
        let (l, r) = $self.pop_pair(&mut $stack)?;
        let result = match (&l, &r) {
            (Value::Integer(a), Value::Integer(b)) => match a.$int_op(*b) {
                Some(v) => Value::Integer(v),
                None => Value::Number(*a as f64 $float_op *b as f64),
            },
            _ => match (l.to_f64().filter(|_| l.is_number()), r.to_f64().filter(|_| r.is_number())) {
                (Some(a), Some(b)) => Value::Number(a $float_op b),
                _ => {
                    return Err(EvaluationError::TypeMismatch {
                        operation: $op_str.to_string(),
                        expected: "Number".to_string(),
                        found: if l.is_number() { r.clone() } else { l.clone() },
                    });
                }
            },
        };
        $stack.push(result);
    }};
}

macro_rules! comparison_op {
    ($self:ident, $stack:ident, $op_str:expr, $op:tt) => {{
        let (l, r) = $self.pop_pair(&mut $stack)?;
        let outcome = match (&l, &r) {
            (Value::String(a), Value::String(b)) => a $op b,
            _ => match (l.to_f64().filter(|_| l.is_number()), r.to_f64().filter(|_| r.is_number())) {
                (Some(a), Some(b)) => a $op b,
                _ => {
                    return Err(EvaluationError::TypeMismatch {
                        operation: $op_str.to_string(),
                        expected: "Number".to_string(),
                        found: if l.is_number() { r.clone() } else { l.clone() },
                    });
                }
            },
        };
        $stack.push(Value::Bool(outcome));
    }};
}

/// The reference stack-based expression evaluator.
#[derive(Debug, Default, Clone, Copy)]
pub struct StackVm;

impl StackVm {
    pub fn new() -> Self {
        Self
    }

    fn pop(&self, stack: &mut Vec<Value>) -> Result<Value, EvaluationError> {
        stack.pop().ok_or(EvaluationError::StackUnderflow)
    }

    fn pop_pair(&self, stack: &mut Vec<Value>) -> Result<(Value, Value), EvaluationError> {
        let r = self.pop(stack)?;
        let l = self.pop(stack)?;
        Ok((l, r))
    }

    fn load(
        &self,
        scope: &'static str,
        slots: &[Value],
        index: u16,
    ) -> Result<Value, EvaluationError> {
        slots
            .get(index as usize)
            .cloned()
            .ok_or(EvaluationError::UnknownVariable { scope, index })
    }

    pub fn run(&self, vars: &Variables<'_>, code: &[u8]) -> Result<Evaluated, EvaluationError> {
        let mut cursor = InstructionCursor::new(code);
        let mut stack: Vec<Value> = Vec::with_capacity(STACK_CAPACITY);

        loop {
            let offset = cursor.offset();
            let op = ExprOp::decode(cursor.read_u8()?, offset)?;
            match op {
                ExprOp::End => break,
                ExprOp::PushNull => stack.push(Value::Null),
                ExprOp::PushBool => stack.push(Value::Bool(cursor.read_u8()? != 0)),
                ExprOp::PushInt => stack.push(Value::Integer(cursor.read_i32_le()?)),
                ExprOp::PushNumber => stack.push(Value::Number(cursor.read_f64_le()?)),
                ExprOp::PushString => stack.push(Value::String(cursor.read_str()?.to_string())),
                ExprOp::LoadLocal => {
                    let index = cursor.read_u16_le()?;
                    stack.push(self.load("local", vars.locals, index)?);
                }
                ExprOp::LoadGlobal => {
                    let index = cursor.read_u16_le()?;
                    stack.push(self.load("global", vars.globals, index)?);
                }
                ExprOp::Add => {
                    // String concatenation takes priority when either side is text
                    if matches!(stack.last(), Some(Value::String(_)))
                        || matches!(stack.iter().rev().nth(1), Some(Value::String(_)))
                    {
                        let (l, r) = self.pop_pair(&mut stack)?;
                        stack.push(Value::String(format!("{}{}", l, r)));
                    } else {
                        arithmetic_op!(self, stack, "+", checked_add, +)
                    }
                }
                ExprOp::Subtract => arithmetic_op!(self, stack, "-", checked_sub, -),
                ExprOp::Multiply => arithmetic_op!(self, stack, "*", checked_mul, *),
                ExprOp::Divide => {
                    let (l, r) = self.pop_pair(&mut stack)?;
                    match (l.to_f64().filter(|_| l.is_number()), r.to_f64().filter(|_| r.is_number())) {
                        (Some(_), Some(b)) if b == 0.0 => {
                            return Err(EvaluationError::DivisionByZero);
                        }
                        (Some(a), Some(b)) => stack.push(Value::Number(a / b)),
                        _ => {
                            return Err(EvaluationError::TypeMismatch {
                                operation: "/".to_string(),
                                expected: "Number".to_string(),
                                found: if l.is_number() { r } else { l },
                            });
                        }
                    }
                }
                ExprOp::Negate => match self.pop(&mut stack)? {
                    Value::Integer(i) => stack.push(Value::Integer(i.wrapping_neg())),
                    Value::Number(n) => stack.push(Value::Number(-n)),
                    other => {
                        return Err(EvaluationError::TypeMismatch {
                            operation: "NEG".to_string(),
                            expected: "Number".to_string(),
                            found: other,
                        });
                    }
                },
                ExprOp::Equal => {
                    let (l, r) = self.pop_pair(&mut stack)?;
                    stack.push(Value::Bool(loose_eq(&l, &r)));
                }
                ExprOp::NotEqual => {
                    let (l, r) = self.pop_pair(&mut stack)?;
                    stack.push(Value::Bool(!loose_eq(&l, &r)));
                }
                ExprOp::LessThan => comparison_op!(self, stack, "<", <),
                ExprOp::GreaterThan => comparison_op!(self, stack, ">", >),
                ExprOp::Not => {
                    let v = self.pop(&mut stack)?;
                    stack.push(Value::Bool(!v.to_bool()));
                }
            }
        }

        if stack.len() != 1 {
            return Err(EvaluationError::UnbalancedStack(stack.len()));
        }
        let value = self.pop(&mut stack)?;
        Ok(Evaluated {
            value,
            consumed: cursor.offset(),
        })
    }
}

/// Numeric values compare by magnitude regardless of representation.
fn loose_eq(l: &Value, r: &Value) -> bool {
    if l.is_number() && r.is_number() {
        return l.to_f64() == r.to_f64();
    }
    l == r
}

impl ExpressionEvaluator for StackVm {
    fn eval_expression(
        &self,
        vars: &Variables<'_>,
        code: &[u8],
    ) -> Result<Evaluated, EvaluationError> {
        self.run(vars, code)
    }

    fn eval_assignable(
        &self,
        vars: &Variables<'_>,
        code: &[u8],
    ) -> Result<(AssignTarget, usize), EvaluationError> {
        let mut cursor = InstructionCursor::new(code);
        let offset = cursor.offset();
        let target = match ExprOp::decode(cursor.read_u8()?, offset)? {
            ExprOp::LoadLocal => {
                let index = cursor.read_u16_le()?;
                self.load("local", vars.locals, index)?;
                AssignTarget::Local(index)
            }
            ExprOp::LoadGlobal => {
                let index = cursor.read_u16_le()?;
                self.load("global", vars.globals, index)?;
                AssignTarget::Global(index)
            }
            _ => return Err(EvaluationError::NotAssignable),
        };
        let offset = cursor.offset();
        match ExprOp::decode(cursor.read_u8()?, offset)? {
            ExprOp::End => Ok((target, cursor.offset())),
            _ => Err(EvaluationError::NotAssignable),
        }
    }
}
