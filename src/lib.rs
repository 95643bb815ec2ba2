//! # Tickflow - Tick-Driven Flow Execution Engine
//!
//! **Tickflow** runs visual "flow" programs (graphs of components connected by sequence
//! outputs) one discrete tick at a time. It is built for embedded-style GUI hosts where
//! everything happens on one thread and nothing may block.
//!
//! ## Core Workflow
//!
//! 1.  **Load Your Assets**: Describe flows as [`FlowAssets`](flow::FlowAssets), either in
//!     code, from JSON, or from the compact binary form produced by `FlowAssets::save`.
//! 2.  **Build an Engine**: Use `FlowEngine::builder` to plug in the instrument host, the
//!     expression evaluator and the debugger sink.
//! 3.  **Start Flows**: `start_flow` instantiates a flow and schedules its `Start` components.
//! 4.  **Tick**: Call `tick` periodically with the host clock and the UI surface. Components
//!     that wait on instrument I/O suspend and resume on later ticks, bound UI properties are
//!     flushed with change detection, and keyframe timelines are evaluated.
//!
//! ## Quick Start
//!
//! ```rust
//! use tickflow::prelude::*;
//! use tickflow::bytecode::compiler::{literal_string, local_ref, ScpiAssembler};
//!
//! # fn main() -> Result<()> {
//! let query = ScpiAssembler::new()
//!     .text("MEAS:VOLT?")
//!     .query_into(&local_ref(0))
//!     .finish();
//! let flow = FlowDefinition::new("main")
//!     .with_local(Value::Null)
//!     .with_component(ComponentDefinition::new(ComponentKind::Start).then(1))
//!     .with_component(ComponentDefinition::new(ComponentKind::Scpi(ScpiComponent {
//!         instrument: literal_string("dmm"),
//!         timeout: None,
//!         delay: None,
//!         instructions: query,
//!     })));
//! let assets = FlowAssets { flows: vec![flow], globals: vec![] };
//!
//! let host = ScriptedHost::new().with_response("MEAS:VOLT?", ScpiResponse::text("3.14\r\n"));
//! let mut engine = FlowEngine::builder(assets).with_host(host).build()?;
//! let page = engine.start_flow(0)?;
//!
//! let mut ui = HeadlessUi::new();
//! engine.tick(0, &mut ui); // issues the query
//! engine.tick(16, &mut ui); // consumes the response
//! assert_eq!(engine.local(page, 0), Some(&Value::Number(3.14)));
//! # Ok(())
//! # }
//! ```

pub mod bytecode;
pub mod config;
pub mod debugger;
pub mod error;
pub mod flow;
pub mod prelude;
pub mod scpi;
pub mod timeline;
pub mod ui;
pub mod value;
