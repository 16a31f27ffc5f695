#![allow(dead_code)]

//! Node types shared by the integration tests: a port-only emitter to
//! send from and a recorder that logs everything it receives.

use flowrt::error::{FlowError, Result};
use flowrt::flow::port::{InPort, OutPort};
use flowrt::flow::{ConnId, NodeContext, NodeOptions, NodeType, Packet, PacketKind};
use flowrt::Node;
use serde::Deserialize;
use std::sync::{Arc, Mutex};

pub type PacketLog = Arc<Mutex<Vec<(String, Packet)>>>;

pub fn new_log() -> PacketLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn log_entries(log: &PacketLog) -> Vec<(String, Packet)> {
    log.lock().unwrap().clone()
}

/// Declares one output port and no behavior; tests emit through
/// `FlowRuntime::send`.
pub struct EmitterType {
    ports: Vec<OutPort>,
}

impl EmitterType {
    pub fn new(kind: PacketKind) -> Arc<Self> {
        Arc::new(Self {
            ports: vec![OutPort::new("OUT", kind)],
        })
    }
}

impl NodeType for EmitterType {
    fn name(&self) -> &str {
        "test/emitter"
    }

    fn ports_in(&self) -> &[InPort] {
        &[]
    }

    fn ports_out(&self) -> &[OutPort] {
        &self.ports
    }

    fn open(&self, _ctx: &mut NodeContext<'_>, _options: &NodeOptions) -> Result<Box<dyn Node>> {
        Ok(Box::new(Emitter))
    }
}

struct Emitter;

impl Node for Emitter {}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RecorderOptions {
    pub label: String,
    /// Fail every process call after logging, to exercise receiver
    /// error isolation.
    pub fail: bool,
}

pub struct RecorderType {
    ports: Vec<InPort>,
    log: PacketLog,
}

impl RecorderType {
    pub fn new(kind: PacketKind, log: PacketLog) -> Arc<Self> {
        Arc::new(Self {
            ports: vec![InPort::new("IN", kind)],
            log,
        })
    }
}

impl NodeType for RecorderType {
    fn name(&self) -> &str {
        "test/recorder"
    }

    fn ports_in(&self) -> &[InPort] {
        &self.ports
    }

    fn ports_out(&self) -> &[OutPort] {
        &[]
    }

    fn open(&self, _ctx: &mut NodeContext<'_>, options: &NodeOptions) -> Result<Box<dyn Node>> {
        let opts: RecorderOptions = options.parse()?;
        Ok(Box::new(Recorder {
            label: opts.label,
            fail: opts.fail,
            log: Arc::clone(&self.log),
        }))
    }
}

struct Recorder {
    label: String,
    fail: bool,
    log: PacketLog,
}

impl Node for Recorder {
    fn process(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        _port: u16,
        _conn: ConnId,
        packet: &Packet,
    ) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push((self.label.clone(), packet.clone()));
        if self.fail {
            return Err(FlowError::Hal(format!("{} refuses packets", self.label)));
        }
        Ok(())
    }
}

pub fn label_options(label: &str) -> NodeOptions {
    NodeOptions::from_value(serde_json::json!({ "label": label }))
}

pub fn failing_options(label: &str) -> NodeOptions {
    NodeOptions::from_value(serde_json::json!({ "label": label, "fail": true }))
}
