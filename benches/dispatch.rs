//! Packet dispatch throughput over growing fan-out widths.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use flowrt::error::Result;
use flowrt::flow::port::{InPort, OutPort};
use flowrt::flow::{ConnId, NodeContext, NodeOptions, NodeType, Packet, PacketKind};
use flowrt::{FlowRuntime, Node};
use std::sync::Arc;

static SRC_OUT: &[OutPort] = &[OutPort::named("OUT", PacketKind::IntRange)];
static SINK_IN: &[InPort] = &[InPort::named("IN", PacketKind::IntRange)];

struct SourceType;
struct Source;

impl NodeType for SourceType {
    fn name(&self) -> &str {
        "bench/source"
    }
    fn ports_in(&self) -> &[InPort] {
        &[]
    }
    fn ports_out(&self) -> &[OutPort] {
        SRC_OUT
    }
    fn open(&self, _ctx: &mut NodeContext<'_>, _options: &NodeOptions) -> Result<Box<dyn Node>> {
        Ok(Box::new(Source))
    }
}

impl Node for Source {}

struct SinkType;
struct Sink {
    total: i64,
}

impl NodeType for SinkType {
    fn name(&self) -> &str {
        "bench/sink"
    }
    fn ports_in(&self) -> &[InPort] {
        SINK_IN
    }
    fn ports_out(&self) -> &[OutPort] {
        &[]
    }
    fn open(&self, _ctx: &mut NodeContext<'_>, _options: &NodeOptions) -> Result<Box<dyn Node>> {
        Ok(Box::new(Sink { total: 0 }))
    }
}

impl Node for Sink {
    fn process(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        _port: u16,
        _conn: ConnId,
        packet: &Packet,
    ) -> Result<()> {
        self.total = self.total.wrapping_add(packet.as_int()?.val as i64);
        Ok(())
    }
}

fn build(fan_out: usize) -> (FlowRuntime, flowrt::NodeId) {
    let mut rt = FlowRuntime::new();
    let src = rt
        .add_node(Arc::new(SourceType), &NodeOptions::empty())
        .unwrap();
    let sink_ty: Arc<dyn NodeType> = Arc::new(SinkType);
    for _ in 0..fan_out {
        let sink = rt.add_node(Arc::clone(&sink_ty), &NodeOptions::empty()).unwrap();
        rt.connect(src, 0, sink, 0).unwrap();
    }
    (rt, src)
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for width in [1usize, 4, 16, 64] {
        let (mut rt, src) = build(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            let mut i = 0i32;
            b.iter(|| {
                i = i.wrapping_add(1);
                rt.send(src, 0, Packet::int(i.into())).unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fan_out);
criterion_main!(benches);
