//! Packet kind converters.

use crate::error::Result;
use crate::flow::context::NodeContext;
use crate::flow::id::ConnId;
use crate::flow::node::{Node, NodeOptions, NodeType};
use crate::flow::packet::{FloatRange, IntRange, Packet, PacketKind, Rgb};
use crate::flow::port::{InPort, OutPort};

static I2F_IN: &[InPort] = &[InPort::named("IN", PacketKind::IntRange)];
static I2F_OUT: &[OutPort] = &[OutPort::named("OUT", PacketKind::FloatRange)];

pub struct IntToFloatType;

impl NodeType for IntToFloatType {
    fn name(&self) -> &str {
        "converter/int-to-float"
    }

    fn ports_in(&self) -> &[InPort] {
        I2F_IN
    }

    fn ports_out(&self) -> &[OutPort] {
        I2F_OUT
    }

    fn open(&self, _ctx: &mut NodeContext<'_>, _options: &NodeOptions) -> Result<Box<dyn Node>> {
        Ok(Box::new(IntToFloat))
    }
}

struct IntToFloat;

impl Node for IntToFloat {
    fn process(
        &mut self,
        ctx: &mut NodeContext<'_>,
        _port: u16,
        _conn: ConnId,
        packet: &Packet,
    ) -> Result<()> {
        let v = packet.as_int()?;
        ctx.send_float(
            0,
            FloatRange::with_bounds(v.val as f64, v.min as f64, v.max as f64, v.step as f64),
        )
    }
}

static F2I_IN: &[InPort] = &[InPort::named("IN", PacketKind::FloatRange)];
static F2I_OUT: &[OutPort] = &[OutPort::named("OUT", PacketKind::IntRange)];

pub struct FloatToIntType;

impl NodeType for FloatToIntType {
    fn name(&self) -> &str {
        "converter/float-to-int"
    }

    fn ports_in(&self) -> &[InPort] {
        F2I_IN
    }

    fn ports_out(&self) -> &[OutPort] {
        F2I_OUT
    }

    fn open(&self, _ctx: &mut NodeContext<'_>, _options: &NodeOptions) -> Result<Box<dyn Node>> {
        Ok(Box::new(FloatToInt))
    }
}

struct FloatToInt;

/// Round to nearest, saturating at the i32 range. NaN maps to zero.
fn round_to_i32(v: f64) -> i32 {
    if v.is_nan() {
        return 0;
    }
    v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

impl Node for FloatToInt {
    fn process(
        &mut self,
        ctx: &mut NodeContext<'_>,
        _port: u16,
        _conn: ConnId,
        packet: &Packet,
    ) -> Result<()> {
        let v = packet.as_float()?;
        ctx.send_int(
            0,
            IntRange::with_bounds(
                round_to_i32(v.val),
                round_to_i32(v.min),
                round_to_i32(v.max),
                round_to_i32(v.step).max(1),
            ),
        )
    }
}

static RGB_IN: &[InPort] = &[
    InPort::named("RED", PacketKind::IntRange),
    InPort::named("GREEN", PacketKind::IntRange),
    InPort::named("BLUE", PacketKind::IntRange),
];
static RGB_OUT: &[OutPort] = &[OutPort::named("OUT", PacketKind::Rgb)];

/// Composes a color once every component has arrived at least once, then
/// re-emits on each component update. Components clamp to 0..=255.
pub struct IntToRgbType;

impl NodeType for IntToRgbType {
    fn name(&self) -> &str {
        "converter/int-to-rgb"
    }

    fn ports_in(&self) -> &[InPort] {
        RGB_IN
    }

    fn ports_out(&self) -> &[OutPort] {
        RGB_OUT
    }

    fn open(&self, _ctx: &mut NodeContext<'_>, _options: &NodeOptions) -> Result<Box<dyn Node>> {
        Ok(Box::new(IntToRgb {
            components: [None; 3],
        }))
    }
}

struct IntToRgb {
    components: [Option<u32>; 3],
}

impl Node for IntToRgb {
    fn process(
        &mut self,
        ctx: &mut NodeContext<'_>,
        port: u16,
        _conn: ConnId,
        packet: &Packet,
    ) -> Result<()> {
        let v = packet.as_int()?;
        self.components[port as usize] = Some(v.val.clamp(0, 255) as u32);
        if let [Some(red), Some(green), Some(blue)] = self.components {
            ctx.send_rgb(0, Rgb::new(red, green, blue))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_i32_saturates() {
        assert_eq!(round_to_i32(1.4), 1);
        assert_eq!(round_to_i32(1.5), 2);
        assert_eq!(round_to_i32(-2.5), -3);
        assert_eq!(round_to_i32(1e12), i32::MAX);
        assert_eq!(round_to_i32(-1e12), i32::MIN);
        assert_eq!(round_to_i32(f64::NAN), 0);
    }
}
