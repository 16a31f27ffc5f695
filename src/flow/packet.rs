//! Typed, immutable packets — the data transfer unit of the flow graph.
//!
//! A packet is a tagged sum type: one variant per built-in kind. The tag
//! (`PacketKind`) is what ports declare and what the dispatcher compares
//! before invoking node code, so a kind mismatch is caught as a distinct
//! error before any payload extraction happens.
//!
//! A packet has no identity beyond a single delivery episode: the sender
//! constructs it, the dispatcher clones it once per fan-out target, and
//! nothing retains it afterwards.

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The kind of value a packet carries.
///
/// Compared by value; a port's declared kind never changes after its node
/// type is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketKind {
    Boolean,
    Byte,
    IntRange,
    FloatRange,
    Rgb,
    String,
    Error,
    /// Payload-less trigger/pulse.
    Empty,
}

impl PacketKind {
    /// Stable lowercase name, as used in script port declarations.
    pub fn name(self) -> &'static str {
        match self {
            PacketKind::Boolean => "boolean",
            PacketKind::Byte => "byte",
            PacketKind::IntRange => "int",
            PacketKind::FloatRange => "float",
            PacketKind::Rgb => "rgb",
            PacketKind::String => "string",
            PacketKind::Error => "error",
            PacketKind::Empty => "empty",
        }
    }

    /// Parse a kind from its stable name. Returns `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "boolean" => Some(PacketKind::Boolean),
            "byte" => Some(PacketKind::Byte),
            "int" => Some(PacketKind::IntRange),
            "float" => Some(PacketKind::FloatRange),
            "rgb" => Some(PacketKind::Rgb),
            "string" => Some(PacketKind::String),
            "error" => Some(PacketKind::Error),
            "empty" => Some(PacketKind::Empty),
            _ => None,
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bounded integer value: a reading plus the range it was taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub val: i32,
    pub min: i32,
    pub max: i32,
    pub step: i32,
}

impl IntRange {
    /// A value over the full i32 range with step 1.
    pub fn new(val: i32) -> Self {
        Self {
            val,
            min: i32::MIN,
            max: i32::MAX,
            step: 1,
        }
    }

    pub fn with_bounds(val: i32, min: i32, max: i32, step: i32) -> Self {
        Self {
            val,
            min,
            max,
            step,
        }
    }
}

impl Default for IntRange {
    fn default() -> Self {
        Self::new(0)
    }
}

impl From<i32> for IntRange {
    fn from(val: i32) -> Self {
        Self::new(val)
    }
}

/// Bounded floating-point value: a reading plus the range it was taken over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub val: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl FloatRange {
    /// A value over the full f64 range with the smallest positive step.
    pub fn new(val: f64) -> Self {
        Self {
            val,
            min: -f64::MAX,
            max: f64::MAX,
            step: f64::MIN_POSITIVE,
        }
    }

    pub fn with_bounds(val: f64, min: f64, max: f64, step: f64) -> Self {
        Self {
            val,
            min,
            max,
            step,
        }
    }
}

impl Default for FloatRange {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl From<f64> for FloatRange {
    fn from(val: f64) -> Self {
        Self::new(val)
    }
}

/// RGB triple with independent per-channel maxima.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub red: u32,
    pub green: u32,
    pub blue: u32,
    pub red_max: u32,
    pub green_max: u32,
    pub blue_max: u32,
}

impl Rgb {
    /// 8-bit channels (maxima 255).
    pub fn new(red: u32, green: u32, blue: u32) -> Self {
        Self {
            red,
            green,
            blue,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
        }
    }
}

/// One typed, immutable value delivered across a link.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Boolean(bool),
    Byte(u8),
    IntRange(IntRange),
    FloatRange(FloatRange),
    Rgb(Rgb),
    String(Arc<str>),
    Error { code: i32, message: Arc<str> },
    Empty,
}

impl Packet {
    pub fn boolean(val: bool) -> Self {
        Packet::Boolean(val)
    }

    pub fn byte(val: u8) -> Self {
        Packet::Byte(val)
    }

    pub fn int(val: IntRange) -> Self {
        Packet::IntRange(val)
    }

    pub fn float(val: FloatRange) -> Self {
        Packet::FloatRange(val)
    }

    pub fn rgb(val: Rgb) -> Self {
        Packet::Rgb(val)
    }

    pub fn string(val: impl Into<Arc<str>>) -> Self {
        Packet::String(val.into())
    }

    pub fn error(code: i32, message: impl Into<Arc<str>>) -> Self {
        Packet::Error {
            code,
            message: message.into(),
        }
    }

    pub fn empty() -> Self {
        Packet::Empty
    }

    /// The kind tag of this packet.
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Boolean(_) => PacketKind::Boolean,
            Packet::Byte(_) => PacketKind::Byte,
            Packet::IntRange(_) => PacketKind::IntRange,
            Packet::FloatRange(_) => PacketKind::FloatRange,
            Packet::Rgb(_) => PacketKind::Rgb,
            Packet::String(_) => PacketKind::String,
            Packet::Error { .. } => PacketKind::Error,
            Packet::Empty => PacketKind::Empty,
        }
    }

    fn mismatch<T>(&self, expected: PacketKind) -> Result<T> {
        Err(FlowError::PacketTypeMismatch {
            expected,
            got: self.kind(),
        })
    }

    /// Extract a boolean payload; fails fast on any other kind.
    pub fn as_boolean(&self) -> Result<bool> {
        match self {
            Packet::Boolean(v) => Ok(*v),
            _ => self.mismatch(PacketKind::Boolean),
        }
    }

    pub fn as_byte(&self) -> Result<u8> {
        match self {
            Packet::Byte(v) => Ok(*v),
            _ => self.mismatch(PacketKind::Byte),
        }
    }

    pub fn as_int(&self) -> Result<IntRange> {
        match self {
            Packet::IntRange(v) => Ok(*v),
            _ => self.mismatch(PacketKind::IntRange),
        }
    }

    pub fn as_float(&self) -> Result<FloatRange> {
        match self {
            Packet::FloatRange(v) => Ok(*v),
            _ => self.mismatch(PacketKind::FloatRange),
        }
    }

    pub fn as_rgb(&self) -> Result<Rgb> {
        match self {
            Packet::Rgb(v) => Ok(*v),
            _ => self.mismatch(PacketKind::Rgb),
        }
    }

    pub fn as_string(&self) -> Result<&str> {
        match self {
            Packet::String(v) => Ok(v),
            _ => self.mismatch(PacketKind::String),
        }
    }

    pub fn as_error(&self) -> Result<(i32, &str)> {
        match self {
            Packet::Error { code, message } => Ok((*code, message)),
            _ => self.mismatch(PacketKind::Error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_names() {
        for kind in [
            PacketKind::Boolean,
            PacketKind::Byte,
            PacketKind::IntRange,
            PacketKind::FloatRange,
            PacketKind::Rgb,
            PacketKind::String,
            PacketKind::Error,
            PacketKind::Empty,
        ] {
            assert_eq!(PacketKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(PacketKind::from_name("quaternion"), None);
    }

    #[test]
    fn test_packet_kind_tag() {
        assert_eq!(Packet::boolean(true).kind(), PacketKind::Boolean);
        assert_eq!(Packet::byte(0x42).kind(), PacketKind::Byte);
        assert_eq!(Packet::string("hi").kind(), PacketKind::String);
        assert_eq!(Packet::error(-5, "nack").kind(), PacketKind::Error);
        assert_eq!(Packet::empty().kind(), PacketKind::Empty);
    }

    #[test]
    fn test_extract_matching_kind() {
        let pkt = Packet::int(IntRange::with_bounds(7, 0, 100, 1));
        let v = pkt.as_int().unwrap();
        assert_eq!(v.val, 7);
        assert_eq!(v.max, 100);

        let pkt = Packet::error(-2, "bus fault");
        let (code, msg) = pkt.as_error().unwrap();
        assert_eq!(code, -2);
        assert_eq!(msg, "bus fault");
    }

    #[test]
    fn test_extract_wrong_kind_fails() {
        let pkt = Packet::boolean(true);
        let err = pkt.as_rgb().unwrap_err();
        match err {
            FlowError::PacketTypeMismatch { expected, got } => {
                assert_eq!(expected, PacketKind::Rgb);
                assert_eq!(got, PacketKind::Boolean);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_int_range_defaults() {
        let r = IntRange::new(10);
        assert_eq!(r.min, i32::MIN);
        assert_eq!(r.max, i32::MAX);
        assert_eq!(r.step, 1);
    }

    #[test]
    fn test_float_range_defaults() {
        let r = FloatRange::new(1.5);
        assert_eq!(r.min, -f64::MAX);
        assert_eq!(r.max, f64::MAX);
        assert_eq!(r.step, f64::MIN_POSITIVE);
    }

    #[test]
    fn test_rgb_default_maxima() {
        let c = Rgb::new(10, 20, 30);
        assert_eq!(c.red_max, 255);
        assert_eq!(c.green_max, 255);
        assert_eq!(c.blue_max, 255);
    }
}
