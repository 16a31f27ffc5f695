//! Scripted node types.
//!
//! A Rhai source file becomes a full node type: its top level declares
//! ports, its functions implement the callbacks. Each node instance gets
//! its own engine and scope so instances never share interpreter state;
//! persistent per-node state goes through the registered `state` /
//! `set_state` functions.
//!
//! Host functions available to scripts:
//! - `send(port, value)` queues a packet on a named output port
//! - `send_error(port, code, message)` queues an error packet
//! - `state(key)` / `set_state(key, value)` per-node key value store
//!
//! Script callbacks, all optional: `open(options)` or `open()`,
//! `process(port, value)`, `connect(port)`, `disconnect(port)`,
//! `close()`.

pub mod node_type;

pub use node_type::ScriptNodeType;

use crate::flow::packet::{FloatRange, IntRange, Packet, PacketKind, Rgb};
use rhai::{Dynamic, Engine, EvalAltResult, Map, Position};

/// Fresh engine with the same safety limits for every instance.
pub(crate) fn new_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_max_expr_depths(64, 64);
    engine.set_max_call_levels(32);
    engine.set_max_operations(100_000);
    engine.set_max_string_size(10_000);
    engine.set_max_array_size(1_000);
    engine.set_max_map_size(1_000);
    engine
}

fn runtime_error(msg: String) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(msg.into(), Position::NONE))
}

/// Expose a packet to script code.
///
/// Scalars map to native Rhai values, ranged values and colors to maps,
/// empty to unit.
pub(crate) fn packet_to_dynamic(packet: &Packet) -> Dynamic {
    match packet {
        Packet::Boolean(v) => (*v).into(),
        Packet::Byte(v) => Dynamic::from(*v as i64),
        Packet::IntRange(v) => {
            let mut map = Map::new();
            map.insert("val".into(), Dynamic::from(v.val as i64));
            map.insert("min".into(), Dynamic::from(v.min as i64));
            map.insert("max".into(), Dynamic::from(v.max as i64));
            map.insert("step".into(), Dynamic::from(v.step as i64));
            Dynamic::from_map(map)
        }
        Packet::FloatRange(v) => {
            let mut map = Map::new();
            map.insert("val".into(), Dynamic::from(v.val));
            map.insert("min".into(), Dynamic::from(v.min));
            map.insert("max".into(), Dynamic::from(v.max));
            map.insert("step".into(), Dynamic::from(v.step));
            Dynamic::from_map(map)
        }
        Packet::Rgb(v) => {
            let mut map = Map::new();
            map.insert("red".into(), Dynamic::from(v.red as i64));
            map.insert("green".into(), Dynamic::from(v.green as i64));
            map.insert("blue".into(), Dynamic::from(v.blue as i64));
            Dynamic::from_map(map)
        }
        Packet::String(s) => Dynamic::from(s.to_string()),
        Packet::Error { code, message } => {
            let mut map = Map::new();
            map.insert("code".into(), Dynamic::from(*code as i64));
            map.insert("message".into(), Dynamic::from(message.to_string()));
            Dynamic::from_map(map)
        }
        Packet::Empty => Dynamic::UNIT,
    }
}

fn map_int(map: &Map, key: &str, default: i64) -> i64 {
    map.get(key).and_then(|d| d.as_int().ok()).unwrap_or(default)
}

fn map_float(map: &Map, key: &str, default: f64) -> f64 {
    map.get(key)
        .and_then(|d| {
            d.as_float()
                .ok()
                .or_else(|| d.as_int().ok().map(|i| i as f64))
        })
        .unwrap_or(default)
}

fn as_i32(value: i64, what: &str) -> Result<i32, Box<EvalAltResult>> {
    i32::try_from(value).map_err(|_| runtime_error(format!("{what} {value} out of range")))
}

/// Build a packet of the port's declared kind from a script value.
pub(crate) fn dynamic_to_packet(
    kind: PacketKind,
    value: Dynamic,
) -> Result<Packet, Box<EvalAltResult>> {
    let type_name = value.type_name();
    let mismatch = move || runtime_error(format!("cannot build {kind} packet from {type_name}"));
    match kind {
        PacketKind::Boolean => value.as_bool().map(Packet::boolean).map_err(|_| mismatch()),
        PacketKind::Byte => {
            let v = value.as_int().map_err(|_| mismatch())?;
            u8::try_from(v)
                .map(Packet::byte)
                .map_err(|_| runtime_error(format!("byte value {v} out of range")))
        }
        PacketKind::IntRange => {
            if let Ok(v) = value.as_int() {
                return Ok(Packet::int(IntRange::new(as_i32(v, "int value")?)));
            }
            let map = value.try_cast::<Map>().ok_or_else(mismatch)?;
            let default = IntRange::new(0);
            Ok(Packet::int(IntRange::with_bounds(
                as_i32(map_int(&map, "val", 0), "int value")?,
                as_i32(map_int(&map, "min", default.min as i64), "int min")?,
                as_i32(map_int(&map, "max", default.max as i64), "int max")?,
                as_i32(map_int(&map, "step", default.step as i64), "int step")?,
            )))
        }
        PacketKind::FloatRange => {
            if let Ok(v) = value.as_float() {
                return Ok(Packet::float(FloatRange::new(v)));
            }
            if let Ok(v) = value.as_int() {
                return Ok(Packet::float(FloatRange::new(v as f64)));
            }
            let map = value.try_cast::<Map>().ok_or_else(mismatch)?;
            let default = FloatRange::new(0.0);
            Ok(Packet::float(FloatRange::with_bounds(
                map_float(&map, "val", 0.0),
                map_float(&map, "min", default.min),
                map_float(&map, "max", default.max),
                map_float(&map, "step", default.step),
            )))
        }
        PacketKind::Rgb => {
            let map = value.try_cast::<Map>().ok_or_else(mismatch)?;
            let component = |key: &str| -> Result<u32, Box<EvalAltResult>> {
                let v = map_int(&map, key, 0);
                u32::try_from(v)
                    .ok()
                    .filter(|v| *v <= 255)
                    .ok_or_else(|| runtime_error(format!("rgb {key} {v} out of range")))
            };
            Ok(Packet::rgb(Rgb::new(
                component("red")?,
                component("green")?,
                component("blue")?,
            )))
        }
        PacketKind::String => {
            let s = value.into_string().map_err(|_| mismatch())?;
            Ok(Packet::string(s))
        }
        PacketKind::Error => {
            let map = value.try_cast::<Map>().ok_or_else(mismatch)?;
            let code = as_i32(map_int(&map, "code", 0), "error code")?;
            let message = map
                .get("message")
                .and_then(|d| d.clone().into_string().ok())
                .unwrap_or_default();
            Ok(Packet::error(code, message))
        }
        PacketKind::Empty => Ok(Packet::empty()),
    }
}

/// Options arrive in scripts as plain Rhai values.
pub(crate) fn json_to_dynamic(value: &serde_json::Value) -> Dynamic {
    match value {
        serde_json::Value::Null => Dynamic::UNIT,
        serde_json::Value::Bool(v) => (*v).into(),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else {
                Dynamic::from(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Dynamic::from(s.clone()),
        serde_json::Value::Array(items) => {
            Dynamic::from_array(items.iter().map(json_to_dynamic).collect())
        }
        serde_json::Value::Object(fields) => {
            let mut map = Map::new();
            for (key, val) in fields {
                map.insert(key.as_str().into(), json_to_dynamic(val));
            }
            Dynamic::from_map(map)
        }
    }
}
