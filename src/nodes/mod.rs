//! Builtin node types and the name registry used by graph descriptions.

pub mod boolean;
pub mod converter;
pub mod gpio;
pub mod uart;

use crate::flow::node::NodeType;
use crate::hal::Board;
use std::collections::HashMap;
use std::sync::Arc;

/// Node types addressable by name, for building graphs from
/// descriptions.
#[derive(Default)]
pub struct Registry {
    types: HashMap<String, Arc<dyn NodeType>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every builtin type, with the hardware ones bound to `board`.
    pub fn with_builtins(board: Arc<dyn Board>) -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(boolean::BoolGateType::new(boolean::GateOp::And)));
        reg.register(Arc::new(boolean::BoolGateType::new(boolean::GateOp::Or)));
        reg.register(Arc::new(boolean::BoolGateType::new(boolean::GateOp::Xor)));
        reg.register(Arc::new(boolean::NotType));
        reg.register(Arc::new(boolean::ToggleType));
        reg.register(Arc::new(converter::IntToFloatType));
        reg.register(Arc::new(converter::FloatToIntType));
        reg.register(Arc::new(converter::IntToRgbType));
        reg.register(Arc::new(gpio::GpioReaderType::new(Arc::clone(&board))));
        reg.register(Arc::new(gpio::GpioWriterType::new(Arc::clone(&board))));
        reg.register(Arc::new(uart::UartType::new(board)));
        reg
    }

    pub fn register(&mut self, ty: Arc<dyn NodeType>) {
        self.types.insert(ty.name().to_owned(), ty);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn NodeType>> {
        self.types.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}
