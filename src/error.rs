use crate::value::Value;
use thiserror::Error;

/// Errors raised while decoding an instruction stream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Read of {needed} byte(s) at offset {offset} is out of bounds (stream length {len})")]
    OutOfBounds {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("Unknown {stream} opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode {
        stream: &'static str,
        opcode: u8,
        offset: usize,
    },

    #[error("String literal at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),
}

/// Errors that can occur while evaluating an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error(
        "Type mismatch during operation '{operation}': expected {expected}, but found value '{found}'"
    )]
    TypeMismatch {
        operation: String,
        expected: String,
        found: Value,
    },

    #[error("Expression is not assignable")]
    NotAssignable,

    #[error("Unknown {scope} variable #{index}")]
    UnknownVariable { scope: &'static str, index: u16 },

    #[error("Stack underflow in expression evaluation")]
    StackUnderflow,

    #[error("Expression left {0} values on the stack, expected exactly one")]
    UnbalancedStack(usize),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Property #{property} does not exist on component #{component}")]
    UnknownProperty { component: usize, property: usize },

    #[error("Flow state {0} does not exist")]
    UnknownFlowState(u32),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A failure scoped to one component of one flow state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComponentError {
    #[error("Component #{component} in flow state {flow_state}: {source}")]
    Evaluation {
        flow_state: u32,
        component: usize,
        #[source]
        source: EvaluationError,
    },

    #[error("Component #{component} in flow state {flow_state}: instrument error: {message}")]
    Instrument {
        flow_state: u32,
        component: usize,
        message: String,
    },

    #[error("Component #{component} in flow state {flow_state}: {source}")]
    Decode {
        flow_state: u32,
        component: usize,
        #[source]
        source: DecodeError,
    },

    #[error("Component #{component} does not exist in flow state {flow_state}")]
    UnknownComponent { flow_state: u32, component: usize },

    #[error("Flow #{0} does not exist in the loaded assets")]
    UnknownFlow(usize),

    #[error("Flow state {0} does not exist")]
    UnknownFlowState(u32),
}

impl ComponentError {
    /// The flow state the failure is scoped to, if any.
    pub fn flow_state(&self) -> Option<u32> {
        match self {
            ComponentError::Evaluation { flow_state, .. }
            | ComponentError::Instrument { flow_state, .. }
            | ComponentError::Decode { flow_state, .. }
            | ComponentError::UnknownComponent { flow_state, .. } => Some(*flow_state),
            ComponentError::UnknownFlowState(id) => Some(*id),
            ComponentError::UnknownFlow(_) => None,
        }
    }
}

/// Errors raised while loading or saving flow assets.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to parse flow assets JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary asset encoding failed: {0}")]
    Encode(String),

    #[error("Binary asset decoding failed: {0}")]
    Decode(String),

    #[error("Could not access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Component #{component} of flow '{flow}' references missing flow #{target}")]
    DanglingFlowReference {
        flow: String,
        component: usize,
        target: usize,
    },

    #[error("Component #{component} of flow '{flow}' connects to missing component #{target}")]
    DanglingConnection {
        flow: String,
        component: usize,
        target: usize,
    },
}

/// Errors raised when an engine configuration is rejected.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse engine configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration value for '{field}': {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}
