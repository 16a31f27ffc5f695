//! GPIO reader and writer nodes.
//!
//! The reader arms its line through the interrupt bridge during `open`
//! and turns edge events into boolean packets. Edges observed between
//! `stop` and the final drain never reach node code.

use crate::error::Result;
use crate::flow::context::NodeContext;
use crate::flow::id::ConnId;
use crate::flow::node::{Node, NodeEvent, NodeOptions, NodeType};
use crate::flow::packet::{Packet, PacketKind};
use crate::flow::port::{InPort, OutPort};
use crate::hal::{Board, GpioLine};
use crate::sched::GpioHandle;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct GpioOptions {
    pin: u32,
    #[serde(default)]
    active_low: bool,
}

static READER_OUT: &[OutPort] = &[OutPort::named("OUT", PacketKind::Boolean)];

pub struct GpioReaderType {
    board: Arc<dyn Board>,
}

impl GpioReaderType {
    pub fn new(board: Arc<dyn Board>) -> Self {
        Self { board }
    }
}

impl NodeType for GpioReaderType {
    fn name(&self) -> &str {
        "gpio/reader"
    }

    fn ports_in(&self) -> &[InPort] {
        &[]
    }

    fn ports_out(&self) -> &[OutPort] {
        READER_OUT
    }

    fn open(&self, ctx: &mut NodeContext<'_>, options: &NodeOptions) -> Result<Box<dyn Node>> {
        let opts: GpioOptions = options.parse()?;
        let line = self.board.open_gpio(opts.pin)?;
        let sender = ctx.signal_sender();
        let node = ctx.node();
        let (handle, trigger) = ctx
            .bridge()
            .register_gpio(move |level| sender.send(node, NodeEvent::GpioEdge { level }));
        line.arm(trigger)?;
        Ok(Box::new(GpioReader {
            line,
            handle: Some(handle),
            active_low: opts.active_low,
        }))
    }
}

struct GpioReader {
    line: Box<dyn GpioLine>,
    handle: Option<GpioHandle>,
    active_low: bool,
}

impl Node for GpioReader {
    /// A new subscriber gets the current level right away.
    fn connect_out(&mut self, ctx: &mut NodeContext<'_>, port: u16, _conn: ConnId) -> Result<()> {
        let level = self.line.read()?;
        ctx.send_boolean(port, level ^ self.active_low)
    }

    fn event(&mut self, ctx: &mut NodeContext<'_>, event: NodeEvent) -> Result<()> {
        if let NodeEvent::GpioEdge { level } = event {
            ctx.send_boolean(0, level ^ self.active_low)?;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.line.disarm();
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
    }
}

static WRITER_IN: &[InPort] = &[InPort::named("IN", PacketKind::Boolean)];

pub struct GpioWriterType {
    board: Arc<dyn Board>,
}

impl GpioWriterType {
    pub fn new(board: Arc<dyn Board>) -> Self {
        Self { board }
    }
}

impl NodeType for GpioWriterType {
    fn name(&self) -> &str {
        "gpio/writer"
    }

    fn ports_in(&self) -> &[InPort] {
        WRITER_IN
    }

    fn ports_out(&self) -> &[OutPort] {
        &[]
    }

    fn open(&self, _ctx: &mut NodeContext<'_>, options: &NodeOptions) -> Result<Box<dyn Node>> {
        let opts: GpioOptions = options.parse()?;
        let line = self.board.open_gpio(opts.pin)?;
        Ok(Box::new(GpioWriter {
            line,
            active_low: opts.active_low,
        }))
    }
}

struct GpioWriter {
    line: Box<dyn GpioLine>,
    active_low: bool,
}

impl Node for GpioWriter {
    fn process(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        _port: u16,
        _conn: ConnId,
        packet: &Packet,
    ) -> Result<()> {
        self.line.write(packet.as_boolean()? ^ self.active_low)
    }
}
