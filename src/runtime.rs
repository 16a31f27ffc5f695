//! The cooperative mainloop.
//!
//! `FlowRuntime` owns a graph plus the shared services every node callback
//! can reach: the interrupt bridge, the timer queue, and the signal
//! channel that bridge callbacks use to route payloads to a node's `event`
//! callback. One `run_once` turn blocks on the bridge up to the earlier of
//! the caller's budget and the next timer deadline, then pumps signals and
//! fires due timers. All node code runs on the thread calling `run`.

use crate::error::Result;
use crate::flow::graph::FlowGraph;
use crate::flow::id::{ConnId, LinkId, NodeId, TimerId};
use crate::flow::node::{NodeEvent, NodeOptions, NodeType};
use crate::flow::packet::Packet;
use crate::sched::InterruptBridge;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// A payload on its way from a bridge callback to a node's `event`
/// callback.
#[derive(Debug, Clone)]
pub struct Signal {
    pub node: NodeId,
    pub event: NodeEvent,
}

/// Cloneable producer end of the signal channel. Safe to move into bridge
/// callbacks; sending never blocks.
#[derive(Clone)]
pub struct SignalSender {
    tx: Sender<Signal>,
}

impl SignalSender {
    pub fn send(&self, node: NodeId, event: NodeEvent) {
        // The receiver only disappears on teardown, when losing the
        // signal is fine.
        let _ = self.tx.send(Signal { node, event });
    }
}

struct TimerEntry {
    id: TimerId,
    node: NodeId,
    deadline: Instant,
    token: u32,
}

/// One-shot timeouts, ordered by deadline with ties in registration
/// order.
#[derive(Default)]
pub struct TimerQueue {
    entries: Vec<TimerEntry>,
    next_id: u64,
}

impl TimerQueue {
    pub fn add(&mut self, node: NodeId, delay: Duration, token: u32) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.push(TimerEntry {
            id,
            node,
            deadline: Instant::now() + delay,
            token,
        });
        id
    }

    pub fn del(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Drop every timer belonging to a node, for node removal.
    pub fn del_node(&mut self, node: NodeId) {
        self.entries.retain(|e| e.node != node);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    /// Remove and return everything due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<(NodeId, u32)> {
        let mut due: Vec<(Instant, NodeId, u32)> = Vec::new();
        self.entries.retain(|e| {
            if e.deadline <= now {
                due.push((e.deadline, e.node, e.token));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|&(deadline, _, _)| deadline);
        due.into_iter().map(|(_, node, token)| (node, token)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared runtime services reachable from every node callback.
pub struct Services {
    bridge: InterruptBridge,
    timers: TimerQueue,
    signal_tx: SignalSender,
    signal_rx: Receiver<Signal>,
}

impl Default for Services {
    fn default() -> Self {
        Self::new()
    }
}

impl Services {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            bridge: InterruptBridge::new(),
            timers: TimerQueue::default(),
            signal_tx: SignalSender { tx },
            signal_rx: rx,
        }
    }

    pub fn bridge(&self) -> &InterruptBridge {
        &self.bridge
    }

    pub fn signal_sender(&self) -> SignalSender {
        self.signal_tx.clone()
    }

    pub fn timers_mut(&mut self) -> &mut TimerQueue {
        &mut self.timers
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    fn try_recv_signal(&self) -> Option<Signal> {
        self.signal_rx.try_recv().ok()
    }
}

/// A graph plus its services, driven from one thread.
pub struct FlowRuntime {
    graph: FlowGraph,
    services: Services,
    running: Arc<AtomicBool>,
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowRuntime {
    pub fn new() -> Self {
        Self {
            graph: FlowGraph::new(),
            services: Services::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn add_node(&mut self, ty: Arc<dyn NodeType>, options: &NodeOptions) -> Result<NodeId> {
        self.graph.add_node(&mut self.services, ty, options)
    }

    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        self.graph.remove_node(&mut self.services, id)
    }

    pub fn connect(
        &mut self,
        src: NodeId,
        src_port: u16,
        dst: NodeId,
        dst_port: u16,
    ) -> Result<LinkId> {
        self.graph.connect(&mut self.services, src, src_port, dst, dst_port)
    }

    pub fn disconnect(&mut self, link: LinkId) -> Result<()> {
        self.graph.disconnect(&mut self.services, link)
    }

    pub fn deliver(&mut self, dst: NodeId, port: u16, conn: ConnId, packet: &Packet) -> Result<()> {
        self.graph.deliver(&mut self.services, dst, port, conn, packet)
    }

    pub fn send(&mut self, src: NodeId, port: u16, packet: Packet) -> Result<()> {
        self.graph.send(&mut self.services, src, port, packet)
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Flag shared with other threads; clearing it makes `run` return
    /// after the current turn.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// One mainloop turn: wait on the bridge up to `wait` (clamped to the
    /// next timer deadline), then pump signals and fire due timers.
    /// Returns how many callbacks ran.
    pub fn run_once(&mut self, wait: Duration) -> usize {
        let now = Instant::now();
        let timeout = match self.services.timers.next_deadline() {
            Some(deadline) => wait.min(deadline.saturating_duration_since(now)),
            None => wait,
        };
        let mut ran = self.services.bridge.drain_or_wait(timeout);
        ran += self.pump_signals();
        ran += self.fire_due_timers();
        ran
    }

    /// Loop until the stop flag clears, then close every node.
    pub fn run(&mut self, tick: Duration) {
        self.running.store(true, Ordering::Release);
        while self.running.load(Ordering::Acquire) {
            self.run_once(tick);
        }
        self.graph.close_all(&mut self.services);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Tear the whole graph down now. `run` does this itself on exit.
    pub fn close_all(&mut self) {
        self.graph.close_all(&mut self.services);
    }

    fn pump_signals(&mut self) -> usize {
        let mut ran = 0;
        while let Some(signal) = self.services.try_recv_signal() {
            match self
                .graph
                .dispatch_event(&mut self.services, signal.node, signal.event)
            {
                Ok(()) => ran += 1,
                Err(err) => warn!(node = %signal.node, %err, "event dispatch failed"),
            }
        }
        ran
    }

    fn fire_due_timers(&mut self) -> usize {
        let due = self.services.timers.take_due(Instant::now());
        let mut ran = 0;
        for (node, token) in due {
            match self
                .graph
                .dispatch_event(&mut self.services, node, NodeEvent::Timer(token))
            {
                Ok(()) => ran += 1,
                Err(err) => warn!(%node, token, %err, "timer dispatch failed"),
            }
        }
        ran
    }
}
