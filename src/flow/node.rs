//! Node abstraction for the flow graph.
//!
//! Two-layer design:
//! - **`NodeType` trait** — the shared, immutable descriptor of a class of
//!   nodes: name, port sequences, and the `open` factory. Many live nodes
//!   share one `Arc<dyn NodeType>`.
//! - **`Node` trait** — the per-instance callbacks operating on private
//!   state. The `Box<dyn Node>` returned by `open` *is* the instance's
//!   private state block; it is owned exclusively by its graph slot and
//!   only touched from the single consumer context, so it needs no
//!   synchronization.
//!
//! `open` failure leaves no live instance and `close` is never called for
//! it. `close` is infallible cleanup, called at most once.

use crate::error::{FlowError, Result};
use crate::flow::context::NodeContext;
use crate::flow::id::ConnId;
use crate::flow::packet::Packet;
use crate::flow::port::{InPort, OutPort};
use serde::de::DeserializeOwned;

/// Shared, immutable descriptor of a class of dataflow nodes.
pub trait NodeType: Send + Sync {
    /// Stable name of this node type, e.g. `"boolean/and"`.
    fn name(&self) -> &str;

    /// Input port descriptors, indexed `0..N-1`.
    fn ports_in(&self) -> &[InPort];

    /// Output port descriptors, indexed `0..N-1`.
    fn ports_out(&self) -> &[OutPort];

    /// Create one instance: validate `options`, acquire resources, return
    /// the private state. Called at most once per instance, before any
    /// other callback. On error nothing was created.
    fn open(&self, ctx: &mut NodeContext<'_>, options: &NodeOptions) -> Result<Box<dyn Node>>;

    /// Number of ports per direction.
    fn ports_counts(&self) -> (u16, u16) {
        (self.ports_in().len() as u16, self.ports_out().len() as u16)
    }

    /// Look up an input port index by name.
    fn port_in_by_name(&self, name: &str) -> Option<u16> {
        self.ports_in()
            .iter()
            .position(|p| p.name == name)
            .map(|i| i as u16)
    }

    /// Look up an output port index by name.
    fn port_out_by_name(&self, name: &str) -> Option<u16> {
        self.ports_out()
            .iter()
            .position(|p| p.name == name)
            .map(|i| i as u16)
    }
}

/// Per-instance callbacks of a live node.
///
/// All methods run in the consumer context, to completion, never
/// interleaved with other node callbacks. Errors from `process` and
/// `event` are receiver-local: the dispatcher logs them and they are never
/// propagated to the sender.
pub trait Node: Send {
    /// Deliver one packet to one input port. The packet's kind has already
    /// been validated against the port's declared kind.
    fn process(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        _port: u16,
        _conn: ConnId,
        _packet: &Packet,
    ) -> Result<()> {
        Ok(())
    }

    /// A link on an input port was established.
    fn connect_in(&mut self, _ctx: &mut NodeContext<'_>, _port: u16, _conn: ConnId) -> Result<()> {
        Ok(())
    }

    /// A link on an input port was removed.
    fn disconnect_in(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        _port: u16,
        _conn: ConnId,
    ) -> Result<()> {
        Ok(())
    }

    /// A link on an output port was established. Lets a producer learn it
    /// has consumers, e.g. to start polling a sensor.
    fn connect_out(&mut self, _ctx: &mut NodeContext<'_>, _port: u16, _conn: ConnId) -> Result<()> {
        Ok(())
    }

    /// A link on an output port was removed.
    fn disconnect_out(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        _port: u16,
        _conn: ConnId,
    ) -> Result<()> {
        Ok(())
    }

    /// An interrupt-bridge or timer signal addressed to this node arrived
    /// in the mainloop.
    fn event(&mut self, _ctx: &mut NodeContext<'_>, _event: NodeEvent) -> Result<()> {
        Ok(())
    }

    /// Release private state. Called at most once, only after a successful
    /// `open`, and must not fail.
    fn close(&mut self) {}
}

/// Signals delivered to a node's `event` callback by the mainloop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEvent {
    /// A GPIO edge interrupt observed by this node's registration.
    GpioEdge { level: bool },
    /// A byte arrived on this node's UART registration.
    UartRx(u8),
    /// This node's UART finished transmitting one byte.
    UartTxDone,
    /// A timeout registered by this node expired.
    Timer(u32),
}

/// Opaque per-instance configuration, validated by each node type's `open`.
#[derive(Debug, Clone, Default)]
pub struct NodeOptions(serde_json::Value);

impl NodeOptions {
    /// No options at all. Node types requiring options reject this.
    pub fn empty() -> Self {
        Self(serde_json::Value::Null)
    }

    pub fn from_value(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Deserialize into the node type's own options struct. This is the
    /// "validated before use" step: unknown shapes fail here, before any
    /// resource is touched.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.0.clone()).map_err(|e| FlowError::Options(e.to_string()))
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct PinOptions {
        pin: u32,
        #[serde(default)]
        active_low: bool,
    }

    #[test]
    fn test_options_parse() {
        let opts = NodeOptions::from_value(serde_json::json!({ "pin": 13 }));
        let parsed: PinOptions = opts.parse().unwrap();
        assert_eq!(parsed.pin, 13);
        assert!(!parsed.active_low);
    }

    #[test]
    fn test_options_reject_bad_shape() {
        let opts = NodeOptions::from_value(serde_json::json!({ "pin": "thirteen" }));
        let err = opts.parse::<PinOptions>().unwrap_err();
        assert!(matches!(err, FlowError::Options(_)));
    }

    #[test]
    fn test_empty_options() {
        let opts = NodeOptions::empty();
        assert!(opts.raw().is_null());
        assert!(opts.parse::<PinOptions>().is_err());
    }
}
