//! Graph construction and packet dispatch.
//!
//! A `FlowGraph` owns node instances in slot storage indexed by `NodeId`
//! and a flat list of links in registration order. Dispatch is
//! run-to-completion: a callback queues emissions in its context's outbox
//! and the graph fans them out only after the callback has returned, so
//! node code never re-enters while another callback is on the stack.

use crate::error::{FlowError, Result, ResultExt};
use crate::flow::context::NodeContext;
use crate::flow::id::{ConnId, LinkId, NodeId};
use crate::flow::node::{Node, NodeEvent, NodeOptions, NodeType};
use crate::flow::packet::Packet;
use crate::flow::port::PortDir;
use crate::runtime::Services;
use std::sync::Arc;
use tracing::warn;

struct NodeSlot {
    ty: Arc<dyn NodeType>,
    node: Box<dyn Node>,
}

/// One live connection between an output port and an input port.
///
/// Each end carries its own connection id, unique among the live links on
/// that (node, port) pair and reused after disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub src: NodeId,
    pub src_port: u16,
    pub src_conn: ConnId,
    pub dst: NodeId,
    pub dst_port: u16,
    pub dst_conn: ConnId,
}

#[derive(Default)]
pub struct FlowGraph {
    slots: Vec<Option<NodeSlot>>,
    links: Vec<Link>,
    next_link_id: u32,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate a node of the given type.
    ///
    /// The id is assigned before `open` runs so the node can capture it for
    /// bridge registrations. If `open` fails nothing is inserted and any
    /// packets it queued are discarded.
    pub fn add_node(
        &mut self,
        services: &mut Services,
        ty: Arc<dyn NodeType>,
        options: &NodeOptions,
    ) -> Result<NodeId> {
        let index = match self.slots.iter().position(Option::is_none) {
            Some(i) => i,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        let id = NodeId(index as u32);
        let mut outbox = Vec::new();
        let node = {
            let mut ctx = NodeContext::new(id, ty.ports_out(), &mut outbox, services);
            ty.open(&mut ctx, options)
                .with_context(|| format!("node type {:?} failed to open", ty.name()))?
        };
        self.slots[index] = Some(NodeSlot { ty, node });
        self.flush(services, id, outbox);
        Ok(id)
    }

    /// Remove a node, severing its links first.
    ///
    /// Both endpoints of every affected link get their disconnect
    /// callbacks, the node's pending timeouts are dropped so no timer
    /// event can reach it afterwards, then its `close` runs and the slot
    /// is freed for reuse.
    pub fn remove_node(&mut self, services: &mut Services, id: NodeId) -> Result<()> {
        if self.slot(id).is_none() {
            return Err(FlowError::UnknownNode(id));
        }
        let touching: Vec<LinkId> = self
            .links
            .iter()
            .filter(|l| l.src == id || l.dst == id)
            .map(|l| l.id)
            .collect();
        for link in touching {
            let _ = self.disconnect(services, link);
        }
        services.timers_mut().del_node(id);
        if let Some(mut slot) = self.slots[id.index()].take() {
            slot.node.close();
        }
        Ok(())
    }

    /// Link an output port to an input port.
    ///
    /// Ports must exist and declare the same packet kind. Connection ids
    /// are the smallest values unused among the live links on each
    /// endpoint. Connect callbacks run on both ends; their errors are
    /// logged, not propagated, and do not undo the link.
    pub fn connect(
        &mut self,
        services: &mut Services,
        src: NodeId,
        src_port: u16,
        dst: NodeId,
        dst_port: u16,
    ) -> Result<LinkId> {
        let out_kind = {
            let slot = self.slot(src).ok_or(FlowError::UnknownNode(src))?;
            let ports = slot.ty.ports_out();
            ports
                .get(src_port as usize)
                .ok_or(FlowError::InvalidPort {
                    node: src,
                    dir: PortDir::Out,
                    port: src_port,
                    count: ports.len() as u16,
                })?
                .kind
        };
        let in_kind = {
            let slot = self.slot(dst).ok_or(FlowError::UnknownNode(dst))?;
            let ports = slot.ty.ports_in();
            ports
                .get(dst_port as usize)
                .ok_or(FlowError::InvalidPort {
                    node: dst,
                    dir: PortDir::In,
                    port: dst_port,
                    count: ports.len() as u16,
                })?
                .kind
        };
        if out_kind != in_kind {
            return Err(FlowError::LinkTypeMismatch { out_kind, in_kind });
        }

        let src_conn = self.alloc_conn(src, src_port, PortDir::Out)?;
        let dst_conn = self.alloc_conn(dst, dst_port, PortDir::In)?;
        let id = LinkId(self.next_link_id);
        self.next_link_id += 1;
        let link = Link {
            id,
            src,
            src_port,
            src_conn,
            dst,
            dst_port,
            dst_conn,
        };
        self.links.push(link);

        if let Err(err) = self.with_node(services, src, |node, ctx| {
            node.connect_out(ctx, src_port, link.src_conn)
        }) {
            warn!(node = %src, port = src_port, %err, "connect callback failed on source");
        }
        if let Err(err) = self.with_node(services, dst, |node, ctx| {
            node.connect_in(ctx, dst_port, link.dst_conn)
        }) {
            warn!(node = %dst, port = dst_port, %err, "connect callback failed on destination");
        }
        Ok(id)
    }

    /// Tear down one link. Disconnect callbacks run on both ends; errors
    /// are logged, not propagated.
    pub fn disconnect(&mut self, services: &mut Services, id: LinkId) -> Result<()> {
        let pos = self
            .links
            .iter()
            .position(|l| l.id == id)
            .ok_or(FlowError::UnknownLink(id))?;
        let link = self.links.remove(pos);

        if let Err(err) = self.with_node(services, link.src, |node, ctx| {
            node.disconnect_out(ctx, link.src_port, link.src_conn)
        }) {
            warn!(node = %link.src, port = link.src_port, %err, "disconnect callback failed on source");
        }
        if let Err(err) = self.with_node(services, link.dst, |node, ctx| {
            node.disconnect_in(ctx, link.dst_port, link.dst_conn)
        }) {
            warn!(node = %link.dst, port = link.dst_port, %err, "disconnect callback failed on destination");
        }
        Ok(())
    }

    /// Push one packet into a node's input port, as if it had arrived over
    /// a link with the given connection id.
    pub fn deliver(
        &mut self,
        services: &mut Services,
        dst: NodeId,
        port: u16,
        conn: ConnId,
        packet: &Packet,
    ) -> Result<()> {
        let kind = {
            let slot = self.slot(dst).ok_or(FlowError::UnknownNode(dst))?;
            let ports = slot.ty.ports_in();
            ports
                .get(port as usize)
                .ok_or(FlowError::InvalidPort {
                    node: dst,
                    dir: PortDir::In,
                    port,
                    count: ports.len() as u16,
                })?
                .kind
        };
        if kind != packet.kind() {
            return Err(FlowError::PacketTypeMismatch {
                expected: kind,
                got: packet.kind(),
            });
        }
        self.with_node(services, dst, |node, ctx| node.process(ctx, port, conn, packet))
    }

    /// Emit one packet from a node's output port.
    ///
    /// Validates the port index and declared kind, then fans out to every
    /// link registered on that port, in registration order. A receiver
    /// failing to process the packet is logged and does not stop the
    /// fan-out or fail the send.
    pub fn send(
        &mut self,
        services: &mut Services,
        src: NodeId,
        port: u16,
        packet: Packet,
    ) -> Result<()> {
        let kind = {
            let slot = self.slot(src).ok_or(FlowError::UnknownNode(src))?;
            let ports = slot.ty.ports_out();
            ports
                .get(port as usize)
                .ok_or(FlowError::InvalidPort {
                    node: src,
                    dir: PortDir::Out,
                    port,
                    count: ports.len() as u16,
                })?
                .kind
        };
        if kind != packet.kind() {
            return Err(FlowError::PacketTypeMismatch {
                expected: kind,
                got: packet.kind(),
            });
        }
        self.fan_out(services, src, port, packet);
        Ok(())
    }

    /// Dispatch a runtime event to a node's `event` callback.
    pub fn dispatch_event(
        &mut self,
        services: &mut Services,
        node: NodeId,
        event: NodeEvent,
    ) -> Result<()> {
        self.with_node(services, node, |n, ctx| n.event(ctx, event))
    }

    /// Tear everything down: sever all links with notifications, drop
    /// every pending timeout, then close every node in slot order.
    pub fn close_all(&mut self, services: &mut Services) {
        let all: Vec<LinkId> = self.links.iter().map(|l| l.id).collect();
        for link in all {
            let _ = self.disconnect(services, link);
        }
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(mut slot) = slot.take() {
                services.timers_mut().del_node(NodeId(index as u32));
                slot.node.close();
            }
        }
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    pub fn node_type(&self, id: NodeId) -> Option<&Arc<dyn NodeType>> {
        self.slot(id).map(|s| &s.ty)
    }

    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    fn slot(&self, id: NodeId) -> Option<&NodeSlot> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    /// Run one callback on a node with a fresh context, then fan out
    /// whatever it queued. On error the queued packets are discarded.
    fn with_node(
        &mut self,
        services: &mut Services,
        id: NodeId,
        f: impl FnOnce(&mut dyn Node, &mut NodeContext<'_>) -> Result<()>,
    ) -> Result<()> {
        let mut outbox = Vec::new();
        {
            let slot = self
                .slots
                .get_mut(id.index())
                .and_then(Option::as_mut)
                .ok_or(FlowError::UnknownNode(id))?;
            let ty = Arc::clone(&slot.ty);
            let mut ctx = NodeContext::new(id, ty.ports_out(), &mut outbox, services);
            f(slot.node.as_mut(), &mut ctx)?;
        }
        self.flush(services, id, outbox);
        Ok(())
    }

    fn flush(&mut self, services: &mut Services, src: NodeId, outbox: Vec<(u16, Packet)>) {
        for (port, packet) in outbox {
            self.fan_out(services, src, port, packet);
        }
    }

    fn fan_out(&mut self, services: &mut Services, src: NodeId, port: u16, packet: Packet) {
        let targets: Vec<(LinkId, NodeId, u16, ConnId)> = self
            .links
            .iter()
            .filter(|l| l.src == src && l.src_port == port)
            .map(|l| (l.id, l.dst, l.dst_port, l.dst_conn))
            .collect();
        for (link, dst, dst_port, conn) in targets {
            if let Err(err) = self.deliver(services, dst, dst_port, conn, &packet) {
                warn!(%src, %dst, %link, port, %err, "receiver failed to process packet");
            }
        }
    }

    /// Smallest connection id not used by a live link on this endpoint.
    fn alloc_conn(&self, node: NodeId, port: u16, dir: PortDir) -> Result<ConnId> {
        let used: Vec<u16> = self
            .links
            .iter()
            .filter_map(|l| match dir {
                PortDir::Out if l.src == node && l.src_port == port => Some(l.src_conn.0),
                PortDir::In if l.dst == node && l.dst_port == port => Some(l.dst_conn.0),
                _ => None,
            })
            .collect();
        let mut candidate = 0u16;
        while used.contains(&candidate) {
            candidate = candidate.checked_add(1).ok_or_else(|| {
                FlowError::Exhausted(format!("connection ids on {dir} port {port} of {node}"))
            })?;
        }
        Ok(ConnId(candidate))
    }
}
