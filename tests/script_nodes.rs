//! Scripted node types driving real graphs.

mod common;

use common::{label_options, log_entries, new_log, EmitterType, RecorderType};
use flowrt::flow::{ConnId, NodeOptions, Packet, PacketKind};
use flowrt::script::ScriptNodeType;
use flowrt::FlowRuntime;
use std::sync::Arc;

#[test]
fn test_script_process_transforms_packets() {
    let src = r#"
        let ports_in = [#{ name: "IN", kind: "int" }];
        let ports_out = [#{ name: "OUT", kind: "int" }];

        fn process(port, value) {
            send("OUT", value.val * 2);
        }
    "#;
    let ty = ScriptNodeType::from_source("script/doubler", src).unwrap();
    let log = new_log();
    let mut rt = FlowRuntime::new();
    let emitter = rt
        .add_node(EmitterType::new(PacketKind::IntRange), &NodeOptions::empty())
        .unwrap();
    let doubler = rt.add_node(ty, &NodeOptions::empty()).unwrap();
    let sink = rt
        .add_node(
            RecorderType::new(PacketKind::IntRange, Arc::clone(&log)),
            &label_options("sink"),
        )
        .unwrap();
    rt.connect(emitter, 0, doubler, 0).unwrap();
    rt.connect(doubler, 0, sink, 0).unwrap();

    rt.send(emitter, 0, Packet::int(21.into())).unwrap();
    let values: Vec<i32> = log_entries(&log)
        .into_iter()
        .map(|(_, p)| p.as_int().unwrap().val)
        .collect();
    assert_eq!(values, vec![42]);
}

#[test]
fn test_script_keeps_state_between_calls() {
    let src = r#"
        let ports_in = [#{ name: "TICK", kind: "empty" }];
        let ports_out = [#{ name: "COUNT", kind: "int" }];

        fn process(port, value) {
            let n = if state("n") == () { 0 } else { state("n") };
            n += 1;
            set_state("n", n);
            send("COUNT", n);
        }
    "#;
    let ty = ScriptNodeType::from_source("script/counter", src).unwrap();
    let log = new_log();
    let mut rt = FlowRuntime::new();
    let counter = rt.add_node(ty, &NodeOptions::empty()).unwrap();
    let sink = rt
        .add_node(
            RecorderType::new(PacketKind::IntRange, Arc::clone(&log)),
            &label_options("sink"),
        )
        .unwrap();
    rt.connect(counter, 0, sink, 0).unwrap();

    for _ in 0..3 {
        rt.deliver(counter, 0, ConnId(0), &Packet::empty()).unwrap();
    }
    let values: Vec<i32> = log_entries(&log)
        .into_iter()
        .map(|(_, p)| p.as_int().unwrap().val)
        .collect();
    assert_eq!(values, vec![1, 2, 3]);
}

#[test]
fn test_script_open_receives_options() {
    let src = r#"
        let ports_in = [#{ name: "IN", kind: "int" }];
        let ports_out = [#{ name: "OUT", kind: "int" }];

        fn open(options) {
            set_state("gain", options.gain);
        }

        fn process(port, value) {
            send("OUT", value.val * state("gain"));
        }
    "#;
    let ty = ScriptNodeType::from_source("script/amplifier", src).unwrap();
    let log = new_log();
    let mut rt = FlowRuntime::new();
    let amp = rt
        .add_node(ty, &NodeOptions::from_value(serde_json::json!({ "gain": 10 })))
        .unwrap();
    let sink = rt
        .add_node(
            RecorderType::new(PacketKind::IntRange, Arc::clone(&log)),
            &label_options("sink"),
        )
        .unwrap();
    rt.connect(amp, 0, sink, 0).unwrap();

    rt.deliver(amp, 0, ConnId(0), &Packet::int(5.into())).unwrap();
    assert_eq!(log_entries(&log)[0].1.as_int().unwrap().val, 50);
}

#[test]
fn test_script_emits_error_packets() {
    let src = r#"
        let ports_in = [#{ name: "IN", kind: "int" }];
        let ports_out = [#{ name: "ERR", kind: "error" }];

        fn process(port, value) {
            if value.val < 0 {
                send_error("ERR", 22, "negative reading");
            }
        }
    "#;
    let ty = ScriptNodeType::from_source("script/validator", src).unwrap();
    let log = new_log();
    let mut rt = FlowRuntime::new();
    let validator = rt.add_node(ty, &NodeOptions::empty()).unwrap();
    let sink = rt
        .add_node(
            RecorderType::new(PacketKind::Error, Arc::clone(&log)),
            &label_options("sink"),
        )
        .unwrap();
    rt.connect(validator, 0, sink, 0).unwrap();

    rt.deliver(validator, 0, ConnId(0), &Packet::int(3.into()))
        .unwrap();
    assert!(log_entries(&log).is_empty());

    rt.deliver(validator, 0, ConnId(0), &Packet::int((-1).into()))
        .unwrap();
    let (code, message) = {
        let entries = log_entries(&log);
        let (c, m) = entries[0].1.as_error().unwrap();
        (c, m.to_owned())
    };
    assert_eq!(code, 22);
    assert_eq!(message, "negative reading");
}

#[test]
fn test_script_connect_callbacks_fire() {
    let src = r#"
        let ports_in = [#{ name: "IN", kind: "boolean" }];
        let ports_out = [#{ name: "SUBSCRIBERS", kind: "int" }];

        fn connect(port) {
            let n = if state("n") == () { 0 } else { state("n") };
            set_state("n", n + 1);
        }

        fn process(port, value) {
            send("SUBSCRIBERS", state("n"));
        }
    "#;
    let ty = ScriptNodeType::from_source("script/subs", src).unwrap();
    let log = new_log();
    let mut rt = FlowRuntime::new();
    let emitter = rt
        .add_node(EmitterType::new(PacketKind::Boolean), &NodeOptions::empty())
        .unwrap();
    let subs = rt.add_node(ty, &NodeOptions::empty()).unwrap();
    let sink = rt
        .add_node(
            RecorderType::new(PacketKind::IntRange, Arc::clone(&log)),
            &label_options("sink"),
        )
        .unwrap();
    rt.connect(emitter, 0, subs, 0).unwrap();
    rt.connect(emitter, 0, subs, 0).unwrap();
    rt.connect(subs, 0, sink, 0).unwrap();

    rt.send(emitter, 0, Packet::boolean(true)).unwrap();
    // Two live connections on IN, each recorded fan-out delivery.
    let values: Vec<i32> = log_entries(&log)
        .into_iter()
        .map(|(_, p)| p.as_int().unwrap().val)
        .collect();
    assert_eq!(values, vec![2, 2]);
}

#[test]
fn test_script_without_process_drops_packets() {
    let src = r#"
        let ports_in = [#{ name: "IN", kind: "boolean" }];
        let ports_out = [];
    "#;
    let ty = ScriptNodeType::from_source("script/mute", src).unwrap();
    let mut rt = FlowRuntime::new();
    let mute = rt.add_node(ty, &NodeOptions::empty()).unwrap();
    rt.deliver(mute, 0, ConnId(0), &Packet::boolean(true)).unwrap();
}

#[test]
fn test_script_runtime_error_surfaces_as_process_error() {
    let src = r#"
        let ports_in = [#{ name: "IN", kind: "int" }];
        let ports_out = [#{ name: "OUT", kind: "int" }];

        fn process(port, value) {
            send("NO_SUCH_PORT", value.val);
        }
    "#;
    let ty = ScriptNodeType::from_source("script/broken", src).unwrap();
    let mut rt = FlowRuntime::new();
    let broken = rt.add_node(ty, &NodeOptions::empty()).unwrap();
    assert!(rt
        .deliver(broken, 0, ConnId(0), &Packet::int(1.into()))
        .is_err());
}
