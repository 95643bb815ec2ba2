//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from the tickflow crate.
//! Import this module to get access to the core functionality without having to import
//! each type individually.
//!
//! # Example
//!
//! ```rust,no_run
//! use tickflow::prelude::*;
//!
//! # fn run_example() -> Result<()> {
//! let assets = FlowAssets::from_file("path/to/assets.json")?;
//! let mut engine = FlowEngine::builder(assets).build()?;
//! engine.start_flow(0)?;
//!
//! let mut ui = HeadlessUi::new();
//! for frame in 0..60 {
//!     engine.tick(frame * 16, &mut ui);
//! }
//! for error in engine.drain_errors() {
//!     eprintln!("{}", error);
//! }
//! # Ok(())
//! # }
//! ```

// Engine and flow model
pub use crate::config::EngineConfig;
pub use crate::flow::{
    ComponentDefinition, ComponentKind, FlowAssets, FlowDefinition, FlowEngine, FlowStateId,
    TickReport,
};

// Values and evaluation
pub use crate::bytecode::{ExpressionEvaluator, StackVm};
pub use crate::value::Value;

// Instrument I/O
pub use crate::scpi::{
    AsyncIoGateway, InstrumentHost, IoStatus, RecordingHost, ScpiComponent, ScpiRequest,
    ScpiResponse, ScriptedHost,
};

// UI surface, update tasks and timelines
pub use crate::timeline::{Easing, TimelineKeyframe};
pub use crate::ui::{HeadlessUi, ObjectId, UiSurface, UpdateKind, UpdateTask};

// Debugger sinks
pub use crate::debugger::{
    Debugger, DebuggerEvent, JsonLinesDebugger, LogDebugger, RecordingDebugger,
};

// Error types
pub use crate::error::{AssetError, ComponentError, ConfigError, DecodeError, EvaluationError};

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
