use super::InstructionCursor;
use super::opcode::{ExprOp, ScpiOp};
use crate::error::DecodeError;
use itertools::Itertools;

/// Decodes one encoded expression into its op listing, returning the listing and its width.
pub fn disassemble_expression(code: &[u8]) -> Result<(String, usize), DecodeError> {
    let mut cursor = InstructionCursor::new(code);
    let mut ops = Vec::new();
    loop {
        let offset = cursor.offset();
        let op = ExprOp::decode(cursor.read_u8()?, offset)?;
        let text = match op {
            ExprOp::PushBool => format!("PushBool {}", cursor.read_u8()? != 0),
            ExprOp::PushInt => format!("PushInt {}", cursor.read_i32_le()?),
            ExprOp::PushNumber => format!("PushNumber {}", cursor.read_f64_le()?),
            ExprOp::PushString => format!("PushString {:?}", cursor.read_str()?),
            ExprOp::LoadLocal => format!("LoadLocal #{}", cursor.read_u16_le()?),
            ExprOp::LoadGlobal => format!("LoadGlobal #{}", cursor.read_u16_le()?),
            other => format!("{:?}", other),
        };
        ops.push(text);
        if op == ExprOp::End {
            break;
        }
    }
    Ok((ops.iter().join(", "), cursor.offset()))
}

/// Formats an SCPI instruction stream into a human-readable listing for debugging.
pub fn disassemble_scpi(code: &[u8]) -> Result<String, DecodeError> {
    let mut cursor = InstructionCursor::new(code);
    let mut lines = Vec::new();
    loop {
        let offset = cursor.offset();
        let op = ScpiOp::decode(cursor.read_u8()?, offset)?;
        let operand = match op {
            ScpiOp::AppendString => format!(" {:?}", cursor.read_str()?),
            ScpiOp::AppendExpression | ScpiOp::QueryWithAssignment => {
                let (listing, width) = disassemble_expression(cursor.rest())?;
                cursor.advance(width)?;
                format!(" [{}]", listing)
            }
            ScpiOp::Query | ScpiOp::Command | ScpiOp::End => String::new(),
        };
        lines.push(format!("{:04}: {:?}{}", offset, op, operand));
        if op == ScpiOp::End {
            break;
        }
    }
    Ok(lines.join("\n"))
}
