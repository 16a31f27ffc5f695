//! UART node: byte stream in and out of one serial port.
//!
//! Transmission is one byte in flight at a time. Further bytes queue in
//! the node and the next one goes out when the driver reports tx-done.

use crate::error::Result;
use crate::flow::context::NodeContext;
use crate::flow::id::ConnId;
use crate::flow::node::{Node, NodeEvent, NodeOptions, NodeType};
use crate::flow::packet::{Packet, PacketKind};
use crate::flow::port::{InPort, OutPort};
use crate::hal::{Board, UartPort};
use crate::sched::UartHandle;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;

fn default_baud() -> u32 {
    9600
}

#[derive(Debug, Deserialize)]
struct UartOptions {
    port: u32,
    #[serde(default = "default_baud")]
    baud: u32,
}

static UART_IN: &[InPort] = &[InPort::named("IN", PacketKind::Byte)];
static UART_OUT: &[OutPort] = &[OutPort::named("OUT", PacketKind::Byte)];

pub struct UartType {
    board: Arc<dyn Board>,
}

impl UartType {
    pub fn new(board: Arc<dyn Board>) -> Self {
        Self { board }
    }
}

impl NodeType for UartType {
    fn name(&self) -> &str {
        "uart/port"
    }

    fn ports_in(&self) -> &[InPort] {
        UART_IN
    }

    fn ports_out(&self) -> &[OutPort] {
        UART_OUT
    }

    fn open(&self, ctx: &mut NodeContext<'_>, options: &NodeOptions) -> Result<Box<dyn Node>> {
        let opts: UartOptions = options.parse()?;
        let port = self.board.open_uart(opts.port)?;
        let sender = ctx.signal_sender();
        let node = ctx.node();
        let rx_sender = sender.clone();
        let (handle, trigger) = ctx.bridge().register_uart(
            move |byte| rx_sender.send(node, NodeEvent::UartRx(byte)),
            move || sender.send(node, NodeEvent::UartTxDone),
        );
        port.start(opts.baud, trigger)?;
        Ok(Box::new(Uart {
            port,
            handle: Some(handle),
            pending: VecDeque::new(),
            busy: false,
        }))
    }
}

struct Uart {
    port: Box<dyn UartPort>,
    handle: Option<UartHandle>,
    pending: VecDeque<u8>,
    busy: bool,
}

impl Node for Uart {
    fn process(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        _port: u16,
        _conn: ConnId,
        packet: &Packet,
    ) -> Result<()> {
        let byte = packet.as_byte()?;
        if self.busy {
            self.pending.push_back(byte);
            return Ok(());
        }
        self.port.write_byte(byte)?;
        self.busy = true;
        Ok(())
    }

    fn event(&mut self, ctx: &mut NodeContext<'_>, event: NodeEvent) -> Result<()> {
        match event {
            NodeEvent::UartRx(byte) => ctx.send_byte(0, byte),
            NodeEvent::UartTxDone => {
                match self.pending.pop_front() {
                    Some(byte) => self.port.write_byte(byte)?,
                    None => self.busy = false,
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn close(&mut self) {
        self.port.stop();
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
    }
}
