//! Declarative graph descriptions.
//!
//! A description names node instances by type and wires ports by name,
//! so a whole graph can come from a TOML file:
//!
//! ```toml
//! [[nodes]]
//! name = "button"
//! type = "gpio/reader"
//! options = { pin = 4 }
//!
//! [[nodes]]
//! name = "invert"
//! type = "boolean/not"
//!
//! [[links]]
//! src = "button"
//! src_port = "OUT"
//! dst = "invert"
//! dst_port = "IN"
//! ```

use crate::error::{FlowError, Result, ResultExt};
use crate::flow::id::NodeId;
use crate::flow::node::NodeOptions;
use crate::nodes::Registry;
use crate::runtime::FlowRuntime;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct NodeDesc {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub options: toml::Table,
}

#[derive(Debug, Deserialize)]
pub struct LinkDesc {
    pub src: String,
    pub src_port: String,
    pub dst: String,
    pub dst_port: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GraphDescription {
    #[serde(default)]
    pub nodes: Vec<NodeDesc>,
    #[serde(default)]
    pub links: Vec<LinkDesc>,
}

impl GraphDescription {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| FlowError::Options(e.to_string()))
    }

    /// Instantiate every node and link into the runtime. Returns the
    /// instance names mapped to their ids.
    pub fn build(
        &self,
        registry: &Registry,
        runtime: &mut FlowRuntime,
    ) -> Result<HashMap<String, NodeId>> {
        let mut ids = HashMap::new();
        for desc in &self.nodes {
            let ty = registry
                .get(&desc.ty)
                .ok_or_else(|| FlowError::Options(format!("unknown node type {:?}", desc.ty)))?;
            let options = NodeOptions::from_value(
                serde_json::to_value(&desc.options)
                    .map_err(|e| FlowError::Options(e.to_string()))?,
            );
            let id = runtime
                .add_node(ty, &options)
                .with_context(|| format!("failed to instantiate node {:?}", desc.name))?;
            if ids.insert(desc.name.clone(), id).is_some() {
                return Err(FlowError::Options(format!(
                    "duplicate node name {:?}",
                    desc.name
                )));
            }
        }
        for link in &self.links {
            let src = *ids
                .get(&link.src)
                .ok_or_else(|| FlowError::Options(format!("unknown node {:?}", link.src)))?;
            let dst = *ids
                .get(&link.dst)
                .ok_or_else(|| FlowError::Options(format!("unknown node {:?}", link.dst)))?;
            let src_port = port_out(runtime, src, &link.src_port)?;
            let dst_port = port_in(runtime, dst, &link.dst_port)?;
            runtime.connect(src, src_port, dst, dst_port).with_context(|| {
                format!(
                    "failed to link {}:{} to {}:{}",
                    link.src, link.src_port, link.dst, link.dst_port
                )
            })?;
        }
        Ok(ids)
    }
}

fn port_out(runtime: &FlowRuntime, node: NodeId, name: &str) -> Result<u16> {
    let ty = runtime
        .graph()
        .node_type(node)
        .ok_or(FlowError::UnknownNode(node))?;
    ty.port_out_by_name(name)
        .ok_or_else(|| FlowError::Options(format!("{} has no output port {name:?}", ty.name())))
}

fn port_in(runtime: &FlowRuntime, node: NodeId, name: &str) -> Result<u16> {
    let ty = runtime
        .graph()
        .node_type(node)
        .ok_or(FlowError::UnknownNode(node))?;
    ty.port_in_by_name(name)
        .ok_or_else(|| FlowError::Options(format!("{} has no input port {name:?}", ty.name())))
}
