//! Hardware access seams.
//!
//! Node types talk to pins and ports through these traits so graphs can
//! run against real drivers or against [`mock::MockBoard`] in tests and
//! demos. Drivers deliver asynchronous activity through the bridge
//! triggers they are armed with, never by calling node code directly.

use crate::error::{FlowError, Result};
use crate::sched::{GpioTrigger, UartTrigger};

/// One GPIO line, already configured for the direction its node needs.
pub trait GpioLine: Send {
    fn read(&self) -> Result<bool>;
    fn write(&self, level: bool) -> Result<()>;
    /// Start edge reporting through the trigger.
    fn arm(&self, trigger: GpioTrigger) -> Result<()>;
    fn disarm(&self);
}

/// One UART, byte oriented.
pub trait UartPort: Send {
    /// Open the port at `baud` and start reporting activity through the
    /// trigger.
    fn start(&self, baud: u32, trigger: UartTrigger) -> Result<()>;
    fn stop(&self);
    /// Queue one byte for transmission; completion arrives as a tx-done
    /// trigger.
    fn write_byte(&self, byte: u8) -> Result<()>;
}

/// Factory for the lines and ports a board exposes.
pub trait Board: Send + Sync {
    fn open_gpio(&self, pin: u32) -> Result<Box<dyn GpioLine>>;
    fn open_uart(&self, port: u32) -> Result<Box<dyn UartPort>>;
}

pub mod mock {
    //! In-memory board for tests and demos. All lines and ports share one
    //! state table, so a test can flip levels and feed bytes from outside
    //! while nodes hold the line objects.

    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, MutexGuard};

    #[derive(Default)]
    struct GpioState {
        level: bool,
        written: Vec<bool>,
        trigger: Option<GpioTrigger>,
    }

    #[derive(Default)]
    struct UartState {
        baud: Option<u32>,
        trigger: Option<UartTrigger>,
        tx_log: Vec<u8>,
    }

    #[derive(Default)]
    struct BoardState {
        gpios: HashMap<u32, GpioState>,
        uarts: HashMap<u32, UartState>,
    }

    #[derive(Clone, Default)]
    pub struct MockBoard {
        state: Arc<Mutex<BoardState>>,
    }

    fn lock(state: &Arc<Mutex<BoardState>>) -> Result<MutexGuard<'_, BoardState>> {
        state
            .lock()
            .map_err(|_| FlowError::Hal("mock board state poisoned".into()))
    }

    impl MockBoard {
        pub fn new() -> Self {
            Self::default()
        }

        /// Set a line's input level without reporting an edge.
        pub fn set_level(&self, pin: u32, level: bool) {
            if let Ok(mut s) = self.state.lock() {
                s.gpios.entry(pin).or_default().level = level;
            }
        }

        /// Set a line's level and report the edge through the armed
        /// trigger, like an interrupt would. Returns whether a message
        /// was enqueued.
        pub fn fire_gpio(&self, pin: u32, level: bool) -> bool {
            let trigger = {
                let Ok(mut s) = self.state.lock() else {
                    return false;
                };
                let gpio = s.gpios.entry(pin).or_default();
                gpio.level = level;
                gpio.trigger.clone()
            };
            trigger.map(|t| t.fire(level)).unwrap_or(false)
        }

        /// Deliver one received byte on a started port.
        pub fn feed_rx(&self, port: u32, byte: u8) -> bool {
            let trigger = {
                let Ok(s) = self.state.lock() else {
                    return false;
                };
                s.uarts.get(&port).and_then(|u| u.trigger.clone())
            };
            trigger.map(|t| t.rx(byte)).unwrap_or(false)
        }

        /// Report completion of the oldest pending transmission.
        pub fn complete_tx(&self, port: u32) -> bool {
            let trigger = {
                let Ok(s) = self.state.lock() else {
                    return false;
                };
                s.uarts.get(&port).and_then(|u| u.trigger.clone())
            };
            trigger.map(|t| t.tx_done()).unwrap_or(false)
        }

        /// Every level written to a pin, oldest first.
        pub fn written(&self, pin: u32) -> Vec<bool> {
            self.state
                .lock()
                .ok()
                .and_then(|s| s.gpios.get(&pin).map(|g| g.written.clone()))
                .unwrap_or_default()
        }

        /// Every byte transmitted on a port, oldest first.
        pub fn tx_log(&self, port: u32) -> Vec<u8> {
            self.state
                .lock()
                .ok()
                .and_then(|s| s.uarts.get(&port).map(|u| u.tx_log.clone()))
                .unwrap_or_default()
        }

        pub fn gpio_armed(&self, pin: u32) -> bool {
            self.state
                .lock()
                .ok()
                .map(|s| {
                    s.gpios
                        .get(&pin)
                        .map(|g| g.trigger.is_some())
                        .unwrap_or(false)
                })
                .unwrap_or(false)
        }

        pub fn uart_started(&self, port: u32) -> bool {
            self.state
                .lock()
                .ok()
                .map(|s| {
                    s.uarts
                        .get(&port)
                        .map(|u| u.trigger.is_some())
                        .unwrap_or(false)
                })
                .unwrap_or(false)
        }
    }

    pub struct MockGpioLine {
        pin: u32,
        state: Arc<Mutex<BoardState>>,
    }

    impl GpioLine for MockGpioLine {
        fn read(&self) -> Result<bool> {
            let mut s = lock(&self.state)?;
            Ok(s.gpios.entry(self.pin).or_default().level)
        }

        fn write(&self, level: bool) -> Result<()> {
            let mut s = lock(&self.state)?;
            let gpio = s.gpios.entry(self.pin).or_default();
            gpio.level = level;
            gpio.written.push(level);
            Ok(())
        }

        fn arm(&self, trigger: GpioTrigger) -> Result<()> {
            let mut s = lock(&self.state)?;
            s.gpios.entry(self.pin).or_default().trigger = Some(trigger);
            Ok(())
        }

        fn disarm(&self) {
            if let Ok(mut s) = self.state.lock() {
                s.gpios.entry(self.pin).or_default().trigger = None;
            }
        }
    }

    pub struct MockUartPort {
        port: u32,
        state: Arc<Mutex<BoardState>>,
    }

    impl UartPort for MockUartPort {
        fn start(&self, baud: u32, trigger: UartTrigger) -> Result<()> {
            let mut s = lock(&self.state)?;
            let uart = s.uarts.entry(self.port).or_default();
            uart.baud = Some(baud);
            uart.trigger = Some(trigger);
            Ok(())
        }

        fn stop(&self) {
            if let Ok(mut s) = self.state.lock() {
                s.uarts.entry(self.port).or_default().trigger = None;
            }
        }

        fn write_byte(&self, byte: u8) -> Result<()> {
            let mut s = lock(&self.state)?;
            let uart = s.uarts.entry(self.port).or_default();
            if uart.trigger.is_none() {
                return Err(FlowError::Hal(format!("uart {} not started", self.port)));
            }
            uart.tx_log.push(byte);
            Ok(())
        }
    }

    impl Board for MockBoard {
        fn open_gpio(&self, pin: u32) -> Result<Box<dyn GpioLine>> {
            Ok(Box::new(MockGpioLine {
                pin,
                state: Arc::clone(&self.state),
            }))
        }

        fn open_uart(&self, port: u32) -> Result<Box<dyn UartPort>> {
            Ok(Box::new(MockUartPort {
                port,
                state: Arc::clone(&self.state),
            }))
        }
    }

}
