pub mod compiler;
pub mod cursor;
pub mod opcode;
pub mod visualizer;
pub mod vm;

use crate::error::EvaluationError;
use crate::value::Value;

pub use cursor::InstructionCursor;
pub use vm::StackVm;

/// The variables visible to an expression: the flow state's locals and the engine's globals.
pub struct Variables<'a> {
    pub locals: &'a mut [Value],
    pub globals: &'a mut [Value],
}

/// An evaluated expression together with the number of instruction bytes it occupied.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    pub value: Value,
    pub consumed: usize,
}

/// The storage location an assignable expression resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignTarget {
    Local(u16),
    Global(u16),
}

/// Evaluates encoded expressions on behalf of the flow engine.
///
/// Implementations decode `code` from its first byte and must report exactly how many
/// bytes the expression occupied, since components embed expressions inline in their
/// instruction streams.
pub trait ExpressionEvaluator {
    fn eval_expression(
        &self,
        vars: &Variables<'_>,
        code: &[u8],
    ) -> Result<Evaluated, EvaluationError>;

    /// Resolves an expression that names a storage location.
    fn eval_assignable(
        &self,
        vars: &Variables<'_>,
        code: &[u8],
    ) -> Result<(AssignTarget, usize), EvaluationError>;

    fn assign_value(
        &self,
        vars: &mut Variables<'_>,
        target: AssignTarget,
        value: Value,
    ) -> Result<(), EvaluationError> {
        let (scope, index, slot) = match target {
            AssignTarget::Local(i) => ("local", i, vars.locals.get_mut(i as usize)),
            AssignTarget::Global(i) => ("global", i, vars.globals.get_mut(i as usize)),
        };
        let slot = slot.ok_or(EvaluationError::UnknownVariable { scope, index })?;
        *slot = value;
        Ok(())
    }
}
