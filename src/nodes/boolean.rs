//! Boolean logic nodes.
//!
//! Gates hold the last value per input and emit once every connected
//! input has been seen at least once, then again on each update. An input
//! forgets its value when its last connection goes away.

use crate::error::Result;
use crate::flow::context::NodeContext;
use crate::flow::id::ConnId;
use crate::flow::node::{Node, NodeOptions, NodeType};
use crate::flow::packet::{Packet, PacketKind};
use crate::flow::port::{InPort, OutPort};
use serde::Deserialize;

static GATE_IN: &[InPort] = &[
    InPort::named("IN[0]", PacketKind::Boolean),
    InPort::named("IN[1]", PacketKind::Boolean),
];
static GATE_OUT: &[OutPort] = &[OutPort::named("OUT", PacketKind::Boolean)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOp {
    And,
    Or,
    Xor,
}

impl GateOp {
    fn type_name(self) -> &'static str {
        match self {
            GateOp::And => "boolean/and",
            GateOp::Or => "boolean/or",
            GateOp::Xor => "boolean/xor",
        }
    }

    fn fold(self, values: impl Iterator<Item = bool>) -> bool {
        match self {
            GateOp::And => values.fold(true, |acc, v| acc && v),
            GateOp::Or => values.fold(false, |acc, v| acc || v),
            GateOp::Xor => values.fold(false, |acc, v| acc ^ v),
        }
    }
}

/// Two-input gate, one type per operation.
pub struct BoolGateType {
    op: GateOp,
}

impl BoolGateType {
    pub fn new(op: GateOp) -> Self {
        Self { op }
    }
}

impl NodeType for BoolGateType {
    fn name(&self) -> &str {
        self.op.type_name()
    }

    fn ports_in(&self) -> &[InPort] {
        GATE_IN
    }

    fn ports_out(&self) -> &[OutPort] {
        GATE_OUT
    }

    fn open(&self, _ctx: &mut NodeContext<'_>, _options: &NodeOptions) -> Result<Box<dyn Node>> {
        Ok(Box::new(BoolGate {
            op: self.op,
            conns: [0; 2],
            values: [None; 2],
        }))
    }
}

struct BoolGate {
    op: GateOp,
    conns: [u16; 2],
    values: [Option<bool>; 2],
}

impl BoolGate {
    fn ready(&self) -> Option<bool> {
        let mut any = false;
        for (conns, value) in self.conns.iter().zip(&self.values) {
            if *conns > 0 {
                any = true;
                value.as_ref()?;
            }
        }
        if !any {
            return None;
        }
        let connected = self
            .conns
            .iter()
            .zip(&self.values)
            .filter(|(conns, _)| **conns > 0)
            .filter_map(|(_, value)| *value);
        Some(self.op.fold(connected))
    }
}

impl Node for BoolGate {
    fn process(
        &mut self,
        ctx: &mut NodeContext<'_>,
        port: u16,
        _conn: ConnId,
        packet: &Packet,
    ) -> Result<()> {
        self.values[port as usize] = Some(packet.as_boolean()?);
        if let Some(out) = self.ready() {
            ctx.send_boolean(0, out)?;
        }
        Ok(())
    }

    fn connect_in(&mut self, _ctx: &mut NodeContext<'_>, port: u16, _conn: ConnId) -> Result<()> {
        self.conns[port as usize] += 1;
        Ok(())
    }

    fn disconnect_in(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        port: u16,
        _conn: ConnId,
    ) -> Result<()> {
        let conns = &mut self.conns[port as usize];
        *conns = conns.saturating_sub(1);
        if *conns == 0 {
            self.values[port as usize] = None;
        }
        Ok(())
    }
}

static NOT_IN: &[InPort] = &[InPort::named("IN", PacketKind::Boolean)];
static NOT_OUT: &[OutPort] = &[OutPort::named("OUT", PacketKind::Boolean)];

pub struct NotType;

impl NodeType for NotType {
    fn name(&self) -> &str {
        "boolean/not"
    }

    fn ports_in(&self) -> &[InPort] {
        NOT_IN
    }

    fn ports_out(&self) -> &[OutPort] {
        NOT_OUT
    }

    fn open(&self, _ctx: &mut NodeContext<'_>, _options: &NodeOptions) -> Result<Box<dyn Node>> {
        Ok(Box::new(Not))
    }
}

struct Not;

impl Node for Not {
    fn process(
        &mut self,
        ctx: &mut NodeContext<'_>,
        _port: u16,
        _conn: ConnId,
        packet: &Packet,
    ) -> Result<()> {
        ctx.send_boolean(0, !packet.as_boolean()?)
    }
}

static TOGGLE_IN: &[InPort] = &[InPort::named("IN", PacketKind::Empty)];
static TOGGLE_OUT: &[OutPort] = &[OutPort::named("OUT", PacketKind::Boolean)];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ToggleOptions {
    initial_state: bool,
}

/// Flips its state on every empty packet and emits the new state.
pub struct ToggleType;

impl NodeType for ToggleType {
    fn name(&self) -> &str {
        "boolean/toggle"
    }

    fn ports_in(&self) -> &[InPort] {
        TOGGLE_IN
    }

    fn ports_out(&self) -> &[OutPort] {
        TOGGLE_OUT
    }

    fn open(&self, _ctx: &mut NodeContext<'_>, options: &NodeOptions) -> Result<Box<dyn Node>> {
        let opts: ToggleOptions = options.parse()?;
        Ok(Box::new(Toggle {
            state: opts.initial_state,
        }))
    }
}

struct Toggle {
    state: bool,
}

impl Node for Toggle {
    fn process(
        &mut self,
        ctx: &mut NodeContext<'_>,
        _port: u16,
        _conn: ConnId,
        _packet: &Packet,
    ) -> Result<()> {
        self.state = !self.state;
        ctx.send_boolean(0, self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_fold() {
        assert!(GateOp::And.fold([true, true].into_iter()));
        assert!(!GateOp::And.fold([true, false].into_iter()));
        assert!(GateOp::Or.fold([false, true].into_iter()));
        assert!(GateOp::Xor.fold([true, true, true].into_iter()));
        assert!(!GateOp::Xor.fold([true, true].into_iter()));
    }

    #[test]
    fn test_gate_waits_for_all_connected_inputs() {
        let mut gate = BoolGate {
            op: GateOp::And,
            conns: [1, 1],
            values: [None; 2],
        };
        assert!(gate.ready().is_none());
        gate.values[0] = Some(true);
        assert!(gate.ready().is_none());
        gate.values[1] = Some(true);
        assert_eq!(gate.ready(), Some(true));
    }

    #[test]
    fn test_gate_ignores_unconnected_input() {
        let gate = BoolGate {
            op: GateOp::And,
            conns: [1, 0],
            values: [Some(true), None],
        };
        assert_eq!(gate.ready(), Some(true));
    }
}
