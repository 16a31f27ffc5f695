//! Port descriptors for node types.
//!
//! Each node type declares its ports as ordered sequences, indexed
//! `0..N-1` per direction. A port's packet kind is fixed for the lifetime
//! of the node type; the dispatcher validates indices and kinds against
//! these descriptors before any node callback runs.

use crate::flow::packet::PacketKind;
use std::borrow::Cow;
use std::fmt;

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDir {
    In,
    Out,
}

impl fmt::Display for PortDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDir::In => f.write_str("input"),
            PortDir::Out => f.write_str("output"),
        }
    }
}

/// Descriptor of an input port: declared packet kind plus a name used by
/// scripts and graph descriptions.
#[derive(Debug, Clone)]
pub struct InPort {
    pub name: Cow<'static, str>,
    pub kind: PacketKind,
}

impl InPort {
    /// Statically named port, usable in `static` descriptor slices.
    pub const fn named(name: &'static str, kind: PacketKind) -> Self {
        Self {
            name: Cow::Borrowed(name),
            kind,
        }
    }

    /// Dynamically named port (script-defined node types).
    pub fn new(name: impl Into<String>, kind: PacketKind) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            kind,
        }
    }
}

/// Descriptor of an output port. Outputs have no `process`; the kind is
/// what every packet sent on the port must carry.
#[derive(Debug, Clone)]
pub struct OutPort {
    pub name: Cow<'static, str>,
    pub kind: PacketKind,
}

impl OutPort {
    pub const fn named(name: &'static str, kind: PacketKind) -> Self {
        Self {
            name: Cow::Borrowed(name),
            kind,
        }
    }

    pub fn new(name: impl Into<String>, kind: PacketKind) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            kind,
        }
    }
}
