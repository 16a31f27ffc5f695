//! Context passed to node callbacks.
//!
//! `NodeContext` is how node code talks back to the runtime: emitting
//! packets on output ports, registering timeouts, and reaching the
//! interrupt bridge during `open`. Emissions are queued in an outbox and
//! fanned out by the dispatcher after the callback returns, which keeps
//! the run-to-completion guarantee: a callback never observes another
//! node's callback running in the middle of its own.

use crate::error::{FlowError, Result};
use crate::flow::id::{NodeId, TimerId};
use crate::flow::packet::{FloatRange, IntRange, Packet, Rgb};
use crate::flow::port::{OutPort, PortDir};
use crate::runtime::{Services, SignalSender};
use crate::sched::InterruptBridge;
use std::sync::Arc;
use std::time::Duration;

/// Context handed to every node callback.
pub struct NodeContext<'a> {
    node: NodeId,
    ports_out: &'a [OutPort],
    outbox: &'a mut Vec<(u16, Packet)>,
    services: &'a mut Services,
}

impl<'a> NodeContext<'a> {
    pub(crate) fn new(
        node: NodeId,
        ports_out: &'a [OutPort],
        outbox: &'a mut Vec<(u16, Packet)>,
        services: &'a mut Services,
    ) -> Self {
        Self {
            node,
            ports_out,
            outbox,
            services,
        }
    }

    /// Identity of the node this callback belongs to.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Queue one packet for fan-out on an output port.
    ///
    /// Fails only for an invalid port index or a packet kind that differs
    /// from the port's declared kind; never because of what receivers do
    /// with it later.
    pub fn send_packet(&mut self, port: u16, packet: Packet) -> Result<()> {
        let decl = self
            .ports_out
            .get(port as usize)
            .ok_or(FlowError::InvalidPort {
                node: self.node,
                dir: PortDir::Out,
                port,
                count: self.ports_out.len() as u16,
            })?;
        if decl.kind != packet.kind() {
            return Err(FlowError::PacketTypeMismatch {
                expected: decl.kind,
                got: packet.kind(),
            });
        }
        self.outbox.push((port, packet));
        Ok(())
    }

    pub fn send_boolean(&mut self, port: u16, val: bool) -> Result<()> {
        self.send_packet(port, Packet::boolean(val))
    }

    pub fn send_byte(&mut self, port: u16, val: u8) -> Result<()> {
        self.send_packet(port, Packet::byte(val))
    }

    pub fn send_int(&mut self, port: u16, val: IntRange) -> Result<()> {
        self.send_packet(port, Packet::int(val))
    }

    pub fn send_float(&mut self, port: u16, val: FloatRange) -> Result<()> {
        self.send_packet(port, Packet::float(val))
    }

    pub fn send_rgb(&mut self, port: u16, val: Rgb) -> Result<()> {
        self.send_packet(port, Packet::rgb(val))
    }

    pub fn send_string(&mut self, port: u16, val: impl Into<Arc<str>>) -> Result<()> {
        self.send_packet(port, Packet::string(val))
    }

    pub fn send_error(&mut self, port: u16, code: i32, message: impl Into<Arc<str>>) -> Result<()> {
        self.send_packet(port, Packet::error(code, message))
    }

    pub fn send_empty(&mut self, port: u16) -> Result<()> {
        self.send_packet(port, Packet::empty())
    }

    /// The interrupt bridge, for arming registrations during `open`.
    pub fn bridge(&self) -> &InterruptBridge {
        self.services.bridge()
    }

    /// A cloneable sender that bridge callbacks use to forward payloads to
    /// this (or any) node's `event` callback via the mainloop.
    pub fn signal_sender(&self) -> SignalSender {
        self.services.signal_sender()
    }

    /// Schedule a one-shot timeout; expiry delivers
    /// `NodeEvent::Timer(token)` to this node.
    pub fn timeout_add(&mut self, delay: Duration, token: u32) -> TimerId {
        self.services.timers_mut().add(self.node, delay, token)
    }

    /// Cancel a pending timeout. Returns false if it already fired or was
    /// never known.
    pub fn timeout_del(&mut self, id: TimerId) -> bool {
        self.services.timers_mut().del(id)
    }
}
