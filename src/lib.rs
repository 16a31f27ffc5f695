//! # flowrt: dataflow runtime for constrained devices
//!
//! A small flow-based programming runtime in the style of embedded
//! dataflow frameworks: graphs of typed nodes exchange packets over
//! linked ports, hardware interrupts cross into the single mainloop
//! thread over a bounded bridge, and node behavior can be written in
//! Rust or in Rhai scripts.
//!
//! ## Architecture
//!
//! - **flow**: packets, ports, node traits, and the dispatching graph
//! - **sched**: the interrupt-to-mainloop bridge with lifetime-safe
//!   unregistration
//! - **runtime**: the cooperative mainloop with timers and event routing
//! - **hal**: board access traits plus an in-memory mock board
//! - **nodes**: builtin logic, converter, GPIO and UART node types
//! - **script**: Rhai scripted node types with per-instance engines
//! - **desc**: TOML graph descriptions
//!
//! All node callbacks run on the thread driving the runtime. Emissions
//! are deferred to an outbox and fanned out after the emitting callback
//! returns, so node code is always run to completion.
//!
//! ## Example
//!
//! ```
//! use flowrt::desc::GraphDescription;
//! use flowrt::hal::mock::MockBoard;
//! use flowrt::nodes::Registry;
//! use flowrt::runtime::FlowRuntime;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let board = MockBoard::new();
//! let registry = Registry::with_builtins(Arc::new(board.clone()));
//! let mut runtime = FlowRuntime::new();
//!
//! let desc = GraphDescription::from_toml(r#"
//!     [[nodes]]
//!     name = "button"
//!     type = "gpio/reader"
//!     options = { pin = 4 }
//!
//!     [[nodes]]
//!     name = "led"
//!     type = "gpio/writer"
//!     options = { pin = 7 }
//!
//!     [[links]]
//!     src = "button"
//!     src_port = "OUT"
//!     dst = "led"
//!     dst_port = "IN"
//! "#).unwrap();
//! desc.build(&registry, &mut runtime).unwrap();
//!
//! board.fire_gpio(4, true);
//! runtime.run_once(Duration::from_millis(1));
//! assert_eq!(board.written(7).last(), Some(&true));
//! ```

pub mod desc;
pub mod error;
pub mod flow;
pub mod hal;
pub mod nodes;
pub mod runtime;
pub mod sched;
pub mod script;

pub use error::{FlowError, Result};
pub use flow::{
    ConnId, FlowGraph, LinkId, Node, NodeContext, NodeEvent, NodeId, NodeOptions, NodeType, Packet,
    PacketKind,
};
pub use runtime::FlowRuntime;
pub use sched::InterruptBridge;
