//! Node types defined by Rhai source.

use crate::error::{FlowError, Result, ResultExt};
use crate::flow::context::NodeContext;
use crate::flow::id::ConnId;
use crate::flow::node::{Node, NodeOptions, NodeType};
use crate::flow::packet::{Packet, PacketKind};
use crate::flow::port::{InPort, OutPort};
use crate::script::{dynamic_to_packet, json_to_dynamic, new_engine, packet_to_dynamic};
use rhai::{Array, Dynamic, Engine, EvalAltResult, FuncArgs, Map, Scope, AST};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Everything host functions touch from inside the engine.
struct HostState {
    outbox: Mutex<Vec<(u16, Packet)>>,
    state: Mutex<Map>,
    ports_out: Vec<OutPort>,
}

impl HostState {
    fn queue(&self, port: u16, packet: Packet) -> std::result::Result<(), Box<EvalAltResult>> {
        let mut outbox = self
            .outbox
            .lock()
            .map_err(|_| super::runtime_error("script outbox poisoned".into()))?;
        outbox.push((port, packet));
        Ok(())
    }

    fn find_port(&self, name: &str) -> std::result::Result<(u16, PacketKind), Box<EvalAltResult>> {
        self.ports_out
            .iter()
            .position(|p| p.name == name)
            .map(|i| (i as u16, self.ports_out[i].kind))
            .ok_or_else(|| super::runtime_error(format!("unknown output port {name:?}")))
    }
}

fn register_host_fns(engine: &mut Engine, host: Arc<HostState>) {
    {
        let host = Arc::clone(&host);
        engine.register_fn(
            "send",
            move |port: &str, value: Dynamic| -> std::result::Result<(), Box<EvalAltResult>> {
                let (index, kind) = host.find_port(port)?;
                host.queue(index, dynamic_to_packet(kind, value)?)
            },
        );
    }
    {
        let host = Arc::clone(&host);
        engine.register_fn(
            "send_error",
            move |port: &str,
                  code: i64,
                  message: &str|
                  -> std::result::Result<(), Box<EvalAltResult>> {
                let (index, kind) = host.find_port(port)?;
                if kind != PacketKind::Error {
                    return Err(super::runtime_error(format!(
                        "port {port:?} is not an error port"
                    )));
                }
                let code = i32::try_from(code)
                    .map_err(|_| super::runtime_error(format!("error code {code} out of range")))?;
                host.queue(index, Packet::error(code, message))
            },
        );
    }
    {
        let host = Arc::clone(&host);
        engine.register_fn("state", move |key: &str| -> Dynamic {
            host.state
                .lock()
                .ok()
                .and_then(|s| s.get(key).cloned())
                .unwrap_or(Dynamic::UNIT)
        });
    }
    engine.register_fn("set_state", move |key: &str, value: Dynamic| {
        if let Ok(mut s) = host.state.lock() {
            s.insert(key.into(), value);
        }
    });
}

/// Used while reading port declarations, so scripts behave the same at
/// declaration time and at run time.
fn register_stub_fns(engine: &mut Engine) {
    engine.register_fn("send", |_port: &str, _value: Dynamic| {});
    engine.register_fn("send_error", |_port: &str, _code: i64, _message: &str| {});
    engine.register_fn("state", |_key: &str| Dynamic::UNIT);
    engine.register_fn("set_state", |_key: &str, _value: Dynamic| {});
}

fn declared_ports(scope: &Scope, var: &str) -> Result<Vec<(String, PacketKind)>> {
    let Some(arr) = scope.get_value::<Array>(var) else {
        return Ok(Vec::new());
    };
    arr.into_iter()
        .map(|entry| {
            let map = entry
                .try_cast::<Map>()
                .ok_or_else(|| FlowError::Script(format!("{var} entries must be maps")))?;
            let name = map
                .get("name")
                .and_then(|d| d.clone().into_string().ok())
                .ok_or_else(|| FlowError::Script(format!("{var} entry missing \"name\"")))?;
            let kind_name = map
                .get("kind")
                .and_then(|d| d.clone().into_string().ok())
                .ok_or_else(|| FlowError::Script(format!("{var} entry missing \"kind\"")))?;
            let kind = PacketKind::from_name(&kind_name)
                .ok_or_else(|| FlowError::Script(format!("unknown packet kind {kind_name:?}")))?;
            Ok((name, kind))
        })
        .collect()
}

/// A node type whose callbacks live in a Rhai script.
///
/// Ports come from top-level `ports_in` and `ports_out` arrays of
/// `#{ name: "...", kind: "..." }` maps, read once at load time.
#[derive(Debug)]
pub struct ScriptNodeType {
    name: String,
    ast: AST,
    ports_in: Vec<InPort>,
    ports_out: Vec<OutPort>,
}

impl ScriptNodeType {
    pub fn from_source(name: impl Into<String>, source: &str) -> Result<Arc<Self>> {
        let name = name.into();
        let mut engine = new_engine();
        register_stub_fns(&mut engine);
        let ast = engine
            .compile(source)
            .map_err(|e| FlowError::Script(e.to_string()))
            .with_context(|| format!("failed to compile script node type {name:?}"))?;
        let mut scope = Scope::new();
        engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .with_context(|| format!("top-level of script node type {name:?} failed"))?;
        let ports_in = declared_ports(&scope, "ports_in")?
            .into_iter()
            .map(|(name, kind)| InPort::new(name, kind))
            .collect();
        let ports_out = declared_ports(&scope, "ports_out")?
            .into_iter()
            .map(|(name, kind)| OutPort::new(name, kind))
            .collect();
        Ok(Arc::new(Self {
            name,
            ast,
            ports_in,
            ports_out,
        }))
    }
}

impl NodeType for ScriptNodeType {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports_in(&self) -> &[InPort] {
        &self.ports_in
    }

    fn ports_out(&self) -> &[OutPort] {
        &self.ports_out
    }

    fn open(&self, ctx: &mut NodeContext<'_>, options: &NodeOptions) -> Result<Box<dyn Node>> {
        let mut engine = new_engine();
        let host = Arc::new(HostState {
            outbox: Mutex::new(Vec::new()),
            state: Mutex::new(Map::new()),
            ports_out: self.ports_out.clone(),
        });
        register_host_fns(&mut engine, Arc::clone(&host));

        let mut scope = Scope::new();
        engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            .with_context(|| format!("top-level of script node type {:?} failed", self.name))?;

        let mut node = ScriptNode {
            type_name: self.name.clone(),
            engine,
            // Callbacks run against the functions only, so top-level
            // statements do not re-run on every call.
            fn_ast: self.ast.clone_functions_only(),
            scope,
            host,
            ports_in: self.ports_in.clone(),
            missing_process_logged: false,
        };
        if !node.call_optional("open", (json_to_dynamic(options.raw()),))? {
            node.call_optional("open", ())?;
        }
        node.flush(ctx)?;
        Ok(Box::new(node))
    }
}

struct ScriptNode {
    type_name: String,
    engine: Engine,
    fn_ast: AST,
    scope: Scope<'static>,
    host: Arc<HostState>,
    ports_in: Vec<InPort>,
    missing_process_logged: bool,
}

impl ScriptNode {
    /// Call a script function if the script defines it. Returns whether
    /// it was found.
    fn call_optional(&mut self, name: &str, args: impl FuncArgs) -> Result<bool> {
        match self
            .engine
            .call_fn::<Dynamic>(&mut self.scope, &self.fn_ast, name, args)
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if let EvalAltResult::ErrorFunctionNotFound(sig, _) = err.as_ref() {
                    if sig.split(' ').next() == Some(name) {
                        return Ok(false);
                    }
                }
                Err(FlowError::from_rhai_error(err).with_context(format!(
                    "script node type {:?} callback {name:?} failed",
                    self.type_name
                )))
            }
        }
    }

    /// Route everything the script queued out through the node's ports.
    fn flush(&mut self, ctx: &mut NodeContext<'_>) -> Result<()> {
        let queued = {
            let mut outbox = self
                .host
                .outbox
                .lock()
                .map_err(|_| FlowError::Script("script outbox poisoned".into()))?;
            std::mem::take(&mut *outbox)
        };
        for (port, packet) in queued {
            ctx.send_packet(port, packet)?;
        }
        Ok(())
    }

    fn port_name(&self, port: u16) -> String {
        self.ports_in
            .get(port as usize)
            .map(|p| p.name.to_string())
            .unwrap_or_default()
    }
}

impl Node for ScriptNode {
    fn process(
        &mut self,
        ctx: &mut NodeContext<'_>,
        port: u16,
        _conn: ConnId,
        packet: &Packet,
    ) -> Result<()> {
        let args = (self.port_name(port), packet_to_dynamic(packet));
        if !self.call_optional("process", args)? && !self.missing_process_logged {
            warn!(
                node_type = %self.type_name,
                "script receives packets but defines no process function"
            );
            self.missing_process_logged = true;
        }
        self.flush(ctx)
    }

    fn connect_in(&mut self, ctx: &mut NodeContext<'_>, port: u16, _conn: ConnId) -> Result<()> {
        self.call_optional("connect", (self.port_name(port),))?;
        self.flush(ctx)
    }

    fn disconnect_in(&mut self, ctx: &mut NodeContext<'_>, port: u16, _conn: ConnId) -> Result<()> {
        self.call_optional("disconnect", (self.port_name(port),))?;
        self.flush(ctx)
    }

    fn close(&mut self) {
        if let Err(err) = self.call_optional("close", ()) {
            warn!(node_type = %self.type_name, %err, "script close failed");
        }
    }
}
