//! One-shot timeouts end to end: registration during `open`, expiry
//! delivered to the `event` callback, fan-out of the resulting
//! emissions, and cancellation when the owning node goes away.

mod common;

use common::{label_options, log_entries, new_log, RecorderType};
use flowrt::error::Result;
use flowrt::flow::port::{InPort, OutPort};
use flowrt::flow::{NodeContext, NodeEvent, NodeOptions, NodeType, Packet, PacketKind};
use flowrt::{FlowRuntime, Node};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Registers two timeouts in `open`, cancels the second right away, and
/// emits an empty packet whenever one fires.
struct TickerType {
    delay: Duration,
    fired: Arc<Mutex<Vec<u32>>>,
}

struct Ticker {
    fired: Arc<Mutex<Vec<u32>>>,
}

static TICK_OUT: &[OutPort] = &[OutPort::named("OUT", PacketKind::Empty)];

impl NodeType for TickerType {
    fn name(&self) -> &str {
        "test/ticker"
    }
    fn ports_in(&self) -> &[InPort] {
        &[]
    }
    fn ports_out(&self) -> &[OutPort] {
        TICK_OUT
    }
    fn open(&self, ctx: &mut NodeContext<'_>, _options: &NodeOptions) -> Result<Box<dyn Node>> {
        ctx.timeout_add(self.delay, 7);
        let doomed = ctx.timeout_add(self.delay, 9);
        assert!(ctx.timeout_del(doomed));
        assert!(!ctx.timeout_del(doomed));
        Ok(Box::new(Ticker {
            fired: Arc::clone(&self.fired),
        }))
    }
}

impl Node for Ticker {
    fn event(&mut self, ctx: &mut NodeContext<'_>, event: NodeEvent) -> Result<()> {
        if let NodeEvent::Timer(token) = event {
            self.fired.lock().unwrap().push(token);
            ctx.send_empty(0)?;
        }
        Ok(())
    }
}

#[test]
fn test_timeout_fires_and_reaches_linked_nodes() {
    let log = new_log();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let mut rt = FlowRuntime::new();

    let ty = Arc::new(TickerType {
        delay: Duration::from_millis(5),
        fired: Arc::clone(&fired),
    });
    assert_eq!(ty.ports_counts(), (0, 1));
    let ticker = rt.add_node(ty, &NodeOptions::empty()).unwrap();

    let rec = RecorderType::new(PacketKind::Empty, Arc::clone(&log));
    assert_eq!(rec.ports_counts(), (1, 0));
    let sink = rt.add_node(rec, &label_options("sink")).unwrap();
    rt.connect(ticker, 0, sink, 0).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while log_entries(&log).is_empty() && Instant::now() < deadline {
        rt.run_once(Duration::from_millis(10));
    }

    // Only the surviving token fired; the cancelled one never did.
    assert_eq!(fired.lock().unwrap().clone(), vec![7]);
    assert_eq!(log_entries(&log), vec![("sink".to_owned(), Packet::empty())]);
    assert!(rt.services().timers().is_empty());
}

#[test]
fn test_remove_node_discards_pending_timeout() {
    let log = new_log();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let mut rt = FlowRuntime::new();

    let ticker = rt
        .add_node(
            Arc::new(TickerType {
                delay: Duration::from_millis(20),
                fired: Arc::clone(&fired),
            }),
            &NodeOptions::empty(),
        )
        .unwrap();
    let rec = RecorderType::new(PacketKind::Empty, Arc::clone(&log));
    let sink = rt.add_node(rec, &label_options("sink")).unwrap();
    rt.connect(ticker, 0, sink, 0).unwrap();

    rt.remove_node(ticker).unwrap();
    assert!(rt.services().timers().is_empty());

    std::thread::sleep(Duration::from_millis(40));
    rt.run_once(Duration::from_millis(1));
    assert!(fired.lock().unwrap().is_empty());
    assert!(log_entries(&log).is_empty());
}
