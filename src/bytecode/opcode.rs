use crate::error::DecodeError;

/// An instruction of the reference expression encoding.
///
/// Operands follow the opcode byte inline, little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExprOp {
    // End of expression
    End = 0x00,

    // Literals
    PushNull = 0x01,
    PushBool = 0x02,   // u8
    PushInt = 0x03,    // i32
    PushNumber = 0x04, // f64
    PushString = 0x05, // u16 length + bytes

    // Variables
    LoadLocal = 0x10,  // u16 index
    LoadGlobal = 0x11, // u16 index

    // Arithmetic
    Add = 0x20,
    Subtract = 0x21,
    Multiply = 0x22,
    Divide = 0x23,
    Negate = 0x24,

    // Comparison & logic
    Equal = 0x30,
    NotEqual = 0x31,
    LessThan = 0x32,
    GreaterThan = 0x33,
    Not = 0x34,
}

impl ExprOp {
    pub fn decode(byte: u8, offset: usize) -> Result<Self, DecodeError> {
        let op = match byte {
            0x00 => ExprOp::End,
            0x01 => ExprOp::PushNull,
            0x02 => ExprOp::PushBool,
            0x03 => ExprOp::PushInt,
            0x04 => ExprOp::PushNumber,
            0x05 => ExprOp::PushString,
            0x10 => ExprOp::LoadLocal,
            0x11 => ExprOp::LoadGlobal,
            0x20 => ExprOp::Add,
            0x21 => ExprOp::Subtract,
            0x22 => ExprOp::Multiply,
            0x23 => ExprOp::Divide,
            0x24 => ExprOp::Negate,
            0x30 => ExprOp::Equal,
            0x31 => ExprOp::NotEqual,
            0x32 => ExprOp::LessThan,
            0x33 => ExprOp::GreaterThan,
            0x34 => ExprOp::Not,
            opcode => {
                return Err(DecodeError::UnknownOpcode {
                    stream: "expression",
                    opcode,
                    offset,
                });
            }
        };
        Ok(op)
    }
}

/// An instruction of the SCPI component's command-building stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScpiOp {
    /// `u16` length prefix followed by literal bytes appended to the command text.
    AppendString = 0,
    /// An expression whose value is appended to the command text.
    AppendExpression = 1,
    /// Issue the text as a query and assign the result through the assignable expression that follows.
    QueryWithAssignment = 2,
    /// Issue the text as a query and discard the result.
    Query = 3,
    /// Issue the text as a command.
    Command = 4,
    End = 5,
}

impl ScpiOp {
    pub fn decode(byte: u8, offset: usize) -> Result<Self, DecodeError> {
        let op = match byte {
            0 => ScpiOp::AppendString,
            1 => ScpiOp::AppendExpression,
            2 => ScpiOp::QueryWithAssignment,
            3 => ScpiOp::Query,
            4 => ScpiOp::Command,
            5 => ScpiOp::End,
            opcode => {
                return Err(DecodeError::UnknownOpcode {
                    stream: "scpi",
                    opcode,
                    offset,
                });
            }
        };
        Ok(op)
    }
}
