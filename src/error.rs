//! Error handling for the flowrt runtime
//!
//! This module defines the error taxonomy shared by the dispatch model and
//! the interrupt scheduler, plus a Result alias used throughout the crate.
//!
//! Contract violations (bad port index, packet kind mismatch) get their own
//! variants so callers can tell a programming error apart from a hardware
//! failure or resource exhaustion.

use crate::flow::id::{LinkId, NodeId};
use crate::flow::packet::PacketKind;
use crate::flow::port::PortDir;
use thiserror::Error;

/// Main error type for flowrt operations
#[derive(Error, Debug)]
pub enum FlowError {
    /// A port index outside the node type's declared range
    #[error("invalid {dir} port {port} on node {node} ({count} {dir} ports)")]
    InvalidPort {
        node: NodeId,
        dir: PortDir,
        port: u16,
        count: u16,
    },

    /// A packet whose kind does not match the port's declared kind
    #[error("packet kind mismatch: port expects {expected}, got {got}")]
    PacketTypeMismatch {
        expected: PacketKind,
        got: PacketKind,
    },

    /// A link between ports of different packet kinds
    #[error("cannot link {out_kind} output to {in_kind} input")]
    LinkTypeMismatch {
        out_kind: PacketKind,
        in_kind: PacketKind,
    },

    /// A node id that no live node answers to
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// A link id that no live link answers to
    #[error("unknown link {0}")]
    UnknownLink(LinkId),

    /// A bounded queue or id space ran out
    #[error("resource exhausted: {0}")]
    Exhausted(String),

    /// A node type's open refused the instance
    #[error("open failed: {0}")]
    Open(String),

    /// Per-instance options that failed the node type's validation
    #[error("invalid node options: {0}")]
    Options(String),

    /// Errors surfaced by script-backed node types
    #[error("script error: {0}")]
    Script(String),

    /// Errors surfaced by hardware access behind the HAL seams
    #[error("hardware error: {0}")]
    Hal(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FlowError>,
    },
}

impl FlowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FlowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a script error from a Rhai error
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        FlowError::Script(err.to_string())
    }
}

/// Result type alias for flowrt operations
pub type Result<T> = std::result::Result<T, FlowError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, Box<rhai::EvalAltResult>> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| FlowError::from_rhai_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| FlowError::from_rhai_error(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlowError::PacketTypeMismatch {
            expected: PacketKind::Boolean,
            got: PacketKind::Rgb,
        };
        assert_eq!(
            err.to_string(),
            "packet kind mismatch: port expects boolean, got rgb"
        );
    }

    #[test]
    fn test_invalid_port_display() {
        let err = FlowError::InvalidPort {
            node: NodeId(3),
            dir: PortDir::Out,
            port: 7,
            count: 2,
        };
        assert!(err.to_string().contains("port 7"));
        assert!(err.to_string().contains("output"));
    }

    #[test]
    fn test_error_with_context() {
        let err = FlowError::Open("no such pin".to_string());
        let with_ctx = err.with_context("gpio/reader open");
        assert!(with_ctx.to_string().contains("gpio/reader open"));
    }
}
