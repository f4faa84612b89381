//! Best-effort new-device notifications.
//!
//! Producers never wait: when the queue is full the newest alert is dropped.

use std::fmt;
use std::net::Ipv4Addr;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// A change worth telling the operator about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAlert {
    NewDevice(Ipv4Addr),
}

impl fmt::Display for DeviceAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewDevice(ip) => write!(f, "NEW DEVICE: {ip}"),
        }
    }
}

/// Create a bounded alert queue.
pub fn channel(capacity: usize) -> (AlertSender, AlertStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (AlertSender { tx }, AlertStream { rx })
}

/// Non-blocking producer side.
#[derive(Debug, Clone)]
pub struct AlertSender {
    tx: mpsc::Sender<DeviceAlert>,
}

impl AlertSender {
    /// Enqueue `alert` if there is room. Returns whether it was queued.
    pub fn notify(&self, alert: DeviceAlert) -> bool {
        match self.tx.try_send(alert) {
            Ok(()) => true,
            Err(TrySendError::Full(alert)) => {
                debug!(%alert, "alert queue full, dropping");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Receive-only consumer side.
#[derive(Debug)]
pub struct AlertStream {
    rx: mpsc::Receiver<DeviceAlert>,
}

impl AlertStream {
    /// Wait for the next alert. Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<DeviceAlert> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<DeviceAlert> {
        self.rx.try_recv().ok()
    }

    /// Take every alert currently queued.
    pub fn drain(&mut self) -> Vec<DeviceAlert> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
