//! Bridge between interrupt-context callbacks and the mainloop.
//!
//! Hardware drivers call trigger methods from arbitrary threads (standing
//! in for interrupt context). A trigger never runs user callbacks; it
//! upgrades a weak reference to the registration slot and pushes a message
//! onto a bounded channel. Only the mainloop thread drains the channel and
//! invokes callbacks.
//!
//! Unregistration is safe against in-flight messages: `stop` (or dropping
//! the handle) marks the slot deleted and releases the owner's strong
//! reference, but each queued message holds its own strong reference. The
//! slot is freed only when the last in-flight message has been drained,
//! and a drained message for a deleted slot is discarded without running
//! the callback.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, trace};

/// Messages dropped beyond this many pending, like a fixed-size interrupt
/// message queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

type GpioCallback = Box<dyn FnMut(bool) + Send>;
type RxCallback = Box<dyn FnMut(u8) + Send>;
type TxCallback = Box<dyn FnMut() + Send>;

struct GpioSlot {
    deleted: AtomicBool,
    callback: Mutex<GpioCallback>,
}

struct UartSlot {
    deleted: AtomicBool,
    rx: Mutex<RxCallback>,
    tx: Mutex<TxCallback>,
}

enum Message {
    Gpio { slot: Arc<GpioSlot>, level: bool },
    UartRx { slot: Arc<UartSlot>, byte: u8 },
    UartTxDone { slot: Arc<UartSlot> },
}

/// Fired from driver threads on a GPIO edge.
#[derive(Clone)]
pub struct GpioTrigger {
    slot: Weak<GpioSlot>,
    tx: Sender<Message>,
}

impl GpioTrigger {
    /// Enqueue one edge. Returns false if the registration is gone, was
    /// stopped, or the queue is full (the edge is then lost).
    pub fn fire(&self, level: bool) -> bool {
        let Some(slot) = self.slot.upgrade() else {
            return false;
        };
        if slot.deleted.load(Ordering::Acquire) {
            return false;
        }
        match self.tx.try_send(Message::Gpio { slot, level }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!("bridge queue full, gpio edge dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Fired from driver threads on UART activity. Both directions share one
/// registration slot.
#[derive(Clone)]
pub struct UartTrigger {
    slot: Weak<UartSlot>,
    tx: Sender<Message>,
}

impl UartTrigger {
    pub fn rx(&self, byte: u8) -> bool {
        self.send(|slot| Message::UartRx { slot, byte })
    }

    pub fn tx_done(&self) -> bool {
        self.send(|slot| Message::UartTxDone { slot })
    }

    fn send(&self, make: impl FnOnce(Arc<UartSlot>) -> Message) -> bool {
        let Some(slot) = self.slot.upgrade() else {
            return false;
        };
        if slot.deleted.load(Ordering::Acquire) {
            return false;
        }
        match self.tx.try_send(make(slot)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!("bridge queue full, uart message dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Observation of a registration slot's storage, for checking that it was
/// actually freed after the last in-flight message drained.
#[derive(Clone)]
pub struct HandleWatch {
    inner: Weak<dyn Any + Send + Sync>,
}

impl HandleWatch {
    pub fn is_freed(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

/// Owner side of a GPIO registration. Dropping it stops delivery.
pub struct GpioHandle {
    slot: Option<Arc<GpioSlot>>,
}

impl GpioHandle {
    /// Stop delivery. Messages already queued are discarded when drained;
    /// the slot is freed once the last of them is gone.
    pub fn stop(mut self) {
        self.release();
    }

    pub fn watch(&self) -> HandleWatch {
        let slot = self.slot.as_ref().map(Arc::clone);
        HandleWatch {
            inner: match slot {
                Some(s) => Arc::downgrade(&(s as Arc<dyn Any + Send + Sync>)),
                None => Weak::<GpioSlot>::new() as Weak<dyn Any + Send + Sync>,
            },
        }
    }

    fn release(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.deleted.store(true, Ordering::Release);
            debug!("gpio registration stopped");
        }
    }
}

impl Drop for GpioHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owner side of a UART registration. Covers rx and tx together.
pub struct UartHandle {
    slot: Option<Arc<UartSlot>>,
}

impl UartHandle {
    pub fn stop(mut self) {
        self.release();
    }

    pub fn watch(&self) -> HandleWatch {
        let slot = self.slot.as_ref().map(Arc::clone);
        HandleWatch {
            inner: match slot {
                Some(s) => Arc::downgrade(&(s as Arc<dyn Any + Send + Sync>)),
                None => Weak::<UartSlot>::new() as Weak<dyn Any + Send + Sync>,
            },
        }
    }

    fn release(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.deleted.store(true, Ordering::Release);
            debug!("uart registration stopped");
        }
    }
}

impl Drop for UartHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// The queue between interrupt context and the mainloop.
pub struct InterruptBridge {
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

impl Default for InterruptBridge {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl InterruptBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// Register a callback for GPIO edges. The trigger side is handed to
    /// the driver; the handle side owns the registration.
    pub fn register_gpio(
        &self,
        callback: impl FnMut(bool) + Send + 'static,
    ) -> (GpioHandle, GpioTrigger) {
        let slot = Arc::new(GpioSlot {
            deleted: AtomicBool::new(false),
            callback: Mutex::new(Box::new(callback)),
        });
        let trigger = GpioTrigger {
            slot: Arc::downgrade(&slot),
            tx: self.tx.clone(),
        };
        (GpioHandle { slot: Some(slot) }, trigger)
    }

    /// Register rx and tx callbacks for one UART under a shared slot.
    pub fn register_uart(
        &self,
        rx: impl FnMut(u8) + Send + 'static,
        tx: impl FnMut() + Send + 'static,
    ) -> (UartHandle, UartTrigger) {
        let slot = Arc::new(UartSlot {
            deleted: AtomicBool::new(false),
            rx: Mutex::new(Box::new(rx)),
            tx: Mutex::new(Box::new(tx)),
        });
        let trigger = UartTrigger {
            slot: Arc::downgrade(&slot),
            tx: self.tx.clone(),
        };
        (UartHandle { slot: Some(slot) }, trigger)
    }

    /// Drain everything currently queued, running callbacks for live
    /// slots. Returns how many callbacks ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        while let Ok(msg) = self.rx.try_recv() {
            if Self::consume(msg) {
                ran += 1;
            }
        }
        ran
    }

    /// Drain at most one message. Returns whether a callback ran.
    pub fn drain_one(&self) -> bool {
        match self.rx.try_recv() {
            Ok(msg) => Self::consume(msg),
            Err(_) => false,
        }
    }

    /// Block up to `timeout` for the first message, then drain the rest
    /// without blocking. Returns how many callbacks ran.
    pub fn drain_or_wait(&self, timeout: Duration) -> usize {
        let first = match self.rx.recv_timeout(timeout) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return 0,
        };
        let mut ran = usize::from(Self::consume(first));
        ran += self.drain();
        ran
    }

    /// Run the message's callback unless its slot was deleted. Dropping
    /// the message drops its strong reference, which is what finally frees
    /// a stopped slot.
    fn consume(msg: Message) -> bool {
        match msg {
            Message::Gpio { slot, level } => {
                if slot.deleted.load(Ordering::Acquire) {
                    return false;
                }
                if let Ok(mut cb) = slot.callback.lock() {
                    cb(level);
                    return true;
                }
                false
            }
            Message::UartRx { slot, byte } => {
                if slot.deleted.load(Ordering::Acquire) {
                    return false;
                }
                if let Ok(mut cb) = slot.rx.lock() {
                    cb(byte);
                    return true;
                }
                false
            }
            Message::UartTxDone { slot } => {
                if slot.deleted.load(Ordering::Acquire) {
                    return false;
                }
                if let Ok(mut cb) = slot.tx.lock() {
                    cb();
                    return true;
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_fire_then_drain_runs_callback() {
        let bridge = InterruptBridge::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let (_handle, trigger) = bridge.register_gpio(move |level| {
            assert!(level);
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(trigger.fire(true));
        assert_eq!(bridge.drain(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_discards_in_flight_messages() {
        let bridge = InterruptBridge::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let (handle, trigger) = bridge.register_gpio(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(trigger.fire(true));
        assert!(trigger.fire(false));
        let watch = handle.watch();
        handle.stop();
        assert!(!watch.is_freed());
        assert_eq!(bridge.drain(), 0);
        assert!(watch.is_freed());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fire_after_stop_is_rejected() {
        let bridge = InterruptBridge::new();
        let (handle, trigger) = bridge.register_gpio(|_| {});
        handle.stop();
        assert!(!trigger.fire(true));
        assert_eq!(bridge.drain(), 0);
    }

    #[test]
    fn test_full_queue_drops_messages() {
        let bridge = InterruptBridge::with_capacity(2);
        let (_handle, trigger) = bridge.register_gpio(|_| {});
        assert!(trigger.fire(true));
        assert!(trigger.fire(true));
        assert!(!trigger.fire(true));
        assert_eq!(bridge.drain(), 2);
    }

    #[test]
    fn test_uart_slot_shared_across_directions() {
        let bridge = InterruptBridge::new();
        let bytes = Arc::new(Mutex::new(Vec::new()));
        let b = Arc::clone(&bytes);
        let done = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&done);
        let (handle, trigger) = bridge.register_uart(
            move |byte| {
                if let Ok(mut v) = b.lock() {
                    v.push(byte);
                }
            },
            move || {
                d.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert!(trigger.rx(0x41));
        assert!(trigger.tx_done());
        let watch = handle.watch();
        assert_eq!(bridge.drain(), 2);
        assert_eq!(bytes.lock().unwrap().as_slice(), &[0x41]);
        assert_eq!(done.load(Ordering::SeqCst), 1);
        drop(handle);
        assert!(watch.is_freed());
    }
}
