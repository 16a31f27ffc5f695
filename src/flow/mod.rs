//! The dataflow core: packets, ports, node traits, and the graph that
//! wires them together.

pub mod context;
pub mod graph;
pub mod id;
pub mod node;
pub mod packet;
pub mod port;

pub use context::NodeContext;
pub use graph::{FlowGraph, Link};
pub use id::{ConnId, LinkId, NodeId, TimerId};
pub use node::{Node, NodeEvent, NodeOptions, NodeType};
pub use packet::{FloatRange, IntRange, Packet, PacketKind, Rgb};
pub use port::{InPort, OutPort, PortDir};
