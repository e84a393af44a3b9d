use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Opaque token pairing an outbound request with its eventual asynchronous response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a registered host callback, used only for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CallbackId(String);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a host callback or a suspended flow was let go without a result.
///
/// A release is a cancellation signal, not an error the host should surface to its user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReleaseReason {
    /// A newer registration or request took its place.
    Superseded,
    /// `clearContext` tore the session down.
    ContextCleared,
}

impl fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Superseded => f.write_str("superseded"),
            Self::ContextCleared => f.write_str("context cleared"),
        }
    }
}

/// What a host callback observes on its receiving end.
#[derive(Debug)]
pub enum CallbackEvent<T> {
    Delivered(T),
    Failed(BridgeError),
    Released(ReleaseReason),
}

pub type CallbackReceiver<T> = mpsc::UnboundedReceiver<CallbackEvent<T>>;

/// The bridge-side half of a long-lived host callback.
///
/// Keep-alive callbacks may receive any number of deliveries; a failure or a
/// release is always the last event, after which the channel closes.
#[derive(Debug)]
pub struct HostCallback<T> {
    id: CallbackId,
    sender: mpsc::UnboundedSender<CallbackEvent<T>>,
}

impl<T> HostCallback<T> {
    /// Creates a callback handle together with the receiver the host listens on.
    pub fn channel() -> (Self, CallbackReceiver<T>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let callback = Self {
            id: CallbackId(Uuid::new_v4().to_string()),
            sender,
        };
        (callback, receiver)
    }

    pub fn id(&self) -> &CallbackId {
        &self.id
    }

    fn send(&self, event: CallbackEvent<T>) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Single-occupant registration cell for a long-lived host callback.
///
/// Registering a new occupant always releases the previous one first.
#[derive(Debug)]
pub struct CallbackSlot<T> {
    name: &'static str,
    occupant: Option<HostCallback<T>>,
}

impl<T> CallbackSlot<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            occupant: None,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    /// Stores `callback`, releasing any previous occupant as superseded.
    pub fn set(&mut self, callback: HostCallback<T>) {
        self.release_occupant(ReleaseReason::Superseded);
        debug!(slot = self.name, callback = %callback.id(), "registered callback");
        self.occupant = Some(callback);
    }

    /// Releases the occupant, if any. Returns whether there was one.
    pub fn clear(&mut self, reason: ReleaseReason) -> bool {
        self.release_occupant(reason)
    }

    /// Delivers `value` to the occupant.
    ///
    /// Returns `false` when nothing was delivered: the slot is empty or the host
    /// dropped its receiver.
    pub fn resolve(&self, value: T) -> bool {
        let Some(callback) = &self.occupant else {
            warn!(slot = self.name, "no callback registered, dropping delivery");
            return false;
        };
        let delivered = callback.send(CallbackEvent::Delivered(value));
        if !delivered {
            warn!(slot = self.name, callback = %callback.id(), "host receiver is gone");
        }
        delivered
    }

    /// Fails the occupant with `error` and vacates the slot.
    pub fn reject_with(&mut self, error: BridgeError) -> bool {
        let Some(callback) = self.occupant.take() else {
            warn!(slot = self.name, %error, "no callback registered, dropping rejection");
            return false;
        };
        debug!(slot = self.name, callback = %callback.id(), %error, "rejecting callback");
        callback.send(CallbackEvent::Failed(error))
    }

    fn release_occupant(&mut self, reason: ReleaseReason) -> bool {
        match self.occupant.take() {
            Some(previous) => {
                debug!(slot = self.name, callback = %previous.id(), %reason, "releasing callback");
                previous.send(CallbackEvent::Released(reason));
                true
            }
            None => false,
        }
    }
}
