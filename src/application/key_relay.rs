use crate::domain::callback::{CallbackSlot, CorrelationId, HostCallback, ReleaseReason};
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Ephemeral customer key as returned by the merchant backend, passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EphemeralKey(pub serde_json::Value);

/// Delivered to the host's key callback whenever the native SDK needs a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRequest {
    pub api_version: String,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyResponse {
    Key(EphemeralKey),
    Error(String),
}

/// Arguments of the host's `keyCallbackCompleted` call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyCompletion {
    pub correlation_id: CorrelationId,
    #[serde(default)]
    pub response: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl KeyCompletion {
    /// Exactly one of `response` and `error` must be present.
    pub fn into_response(self) -> Result<(CorrelationId, KeyResponse)> {
        let response = match (self.response, self.error) {
            (Some(key), None) => KeyResponse::Key(EphemeralKey(key)),
            (None, Some(error)) => KeyResponse::Error(error),
            (Some(_), Some(_)) => {
                return Err(BridgeError::InvalidArgument(
                    "provide either a response or an error, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(BridgeError::InvalidArgument(
                    "you must provide either a response or an error".to_string(),
                ));
            }
        };
        Ok((self.correlation_id, response))
    }
}

pub type NativeKeyCompletion = oneshot::Sender<Result<EphemeralKey>>;
pub type NativeKeyReceiver = oneshot::Receiver<Result<EphemeralKey>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    AwaitingHostResponse,
}

#[derive(Debug)]
struct OutstandingKeyRequest {
    correlation_id: CorrelationId,
    api_version: String,
    completion: NativeKeyCompletion,
}

impl OutstandingKeyRequest {
    fn settle(self, result: Result<EphemeralKey>) {
        if self.completion.send(result).is_err() {
            debug!(correlation_id = %self.correlation_id, "native side stopped waiting for key");
        }
    }
}

/// Correlates a native "need a key" event, the host round trip that fetches
/// the key, and the completion of the native handler.
///
/// At most one request is outstanding; every native completion handle is
/// settled exactly once.
#[derive(Debug)]
pub struct EphemeralKeyRelay {
    callback: CallbackSlot<KeyRequest>,
    outstanding: Option<OutstandingKeyRequest>,
}

impl Default for EphemeralKeyRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl EphemeralKeyRelay {
    pub fn new() -> Self {
        Self {
            callback: CallbackSlot::new("key"),
            outstanding: None,
        }
    }

    pub fn state(&self) -> RelayState {
        if self.outstanding.is_some() {
            RelayState::AwaitingHostResponse
        } else {
            RelayState::Idle
        }
    }

    pub fn outstanding_id(&self) -> Option<&CorrelationId> {
        self.outstanding.as_ref().map(|o| &o.correlation_id)
    }

    pub fn set_callback(&mut self, callback: HostCallback<KeyRequest>) {
        self.callback.set(callback);
    }

    /// Native entry point: forwards the request to the host and returns the
    /// handle the native side waits on.
    pub fn request_key(&mut self, api_version: &str) -> NativeKeyReceiver {
        let (completion, receiver) = oneshot::channel();

        if !self.callback.is_occupied() {
            warn!(api_version, "key requested but no key callback is registered");
            let _ = completion.send(Err(BridgeError::NotConfigured(
                "no key callback registered".to_string(),
            )));
            return receiver;
        }

        if let Some(previous) = self.outstanding.take() {
            warn!(
                correlation_id = %previous.correlation_id,
                api_version = %previous.api_version,
                "superseding unanswered key request"
            );
            previous.settle(Err(BridgeError::Released(ReleaseReason::Superseded)));
        }

        let correlation_id = CorrelationId::generate();
        info!(api_version, %correlation_id, "requesting ephemeral key from host");
        let request = KeyRequest {
            api_version: api_version.to_string(),
            correlation_id: correlation_id.clone(),
        };
        if !self.callback.resolve(request) {
            let _ = completion.send(Err(BridgeError::NotConfigured(
                "key callback is no longer listening".to_string(),
            )));
            return receiver;
        }

        self.outstanding = Some(OutstandingKeyRequest {
            correlation_id,
            api_version: api_version.to_string(),
            completion,
        });
        receiver
    }

    /// Host entry point. A mismatched id is rejected and leaves the
    /// outstanding request untouched.
    pub fn complete(&mut self, correlation_id: &CorrelationId, response: KeyResponse) -> Result<()> {
        let Some(outstanding) = self
            .outstanding
            .take_if(|o| o.correlation_id == *correlation_id)
        else {
            return Err(BridgeError::CorrelationMismatch {
                expected: self.outstanding_id().cloned(),
                received: correlation_id.clone(),
            });
        };

        match response {
            KeyResponse::Key(key) => {
                info!(%correlation_id, "ephemeral key delivered");
                outstanding.settle(Ok(key));
            }
            KeyResponse::Error(message) => {
                warn!(%correlation_id, %message, "host failed to fetch ephemeral key");
                outstanding.settle(Err(BridgeError::UpstreamError(message)));
            }
        }
        Ok(())
    }

    /// Fails a stranded request and releases the key callback.
    pub fn reset(&mut self, reason: ReleaseReason) {
        if let Some(outstanding) = self.outstanding.take() {
            info!(correlation_id = %outstanding.correlation_id, %reason, "failing stranded key request");
            outstanding.settle(Err(BridgeError::Released(reason)));
        }
        self.callback.clear(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::callback::CallbackEvent;
    use serde_json::json;

    fn relay_with_callback() -> (EphemeralKeyRelay, crate::domain::callback::CallbackReceiver<KeyRequest>) {
        let mut relay = EphemeralKeyRelay::new();
        let (callback, rx) = HostCallback::channel();
        relay.set_callback(callback);
        (relay, rx)
    }

    fn delivered_id(rx: &mut crate::domain::callback::CallbackReceiver<KeyRequest>) -> CorrelationId {
        match rx.try_recv() {
            Ok(CallbackEvent::Delivered(request)) => request.correlation_id,
            other => panic!("expected key request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_without_callback_fails_immediately() {
        let mut relay = EphemeralKeyRelay::new();
        let receiver = relay.request_key("2020-03-02");

        assert_eq!(relay.state(), RelayState::Idle);
        assert!(matches!(
            receiver.await.unwrap(),
            Err(BridgeError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_matching_response_fulfills_native_handle() {
        let (mut relay, mut rx) = relay_with_callback();
        let receiver = relay.request_key("2020-03-02");
        assert_eq!(relay.state(), RelayState::AwaitingHostResponse);

        let id = delivered_id(&mut rx);
        relay
            .complete(&id, KeyResponse::Key(EphemeralKey(json!({ "secret": "ek_1" }))))
            .unwrap();

        assert_eq!(relay.state(), RelayState::Idle);
        let key = receiver.await.unwrap().unwrap();
        assert_eq!(key.0["secret"], "ek_1");
    }

    #[tokio::test]
    async fn test_mismatched_response_is_rejected_without_touching_handle() {
        let (mut relay, mut rx) = relay_with_callback();
        let mut receiver = relay.request_key("2020-03-02");
        let id = delivered_id(&mut rx);

        let result = relay.complete(
            &CorrelationId::from("bogus"),
            KeyResponse::Key(EphemeralKey(json!({}))),
        );
        assert!(matches!(
            result,
            Err(BridgeError::CorrelationMismatch { expected: Some(ref e), .. }) if *e == id
        ));
        assert_eq!(relay.state(), RelayState::AwaitingHostResponse);
        assert!(receiver.try_recv().is_err());

        relay
            .complete(&id, KeyResponse::Key(EphemeralKey(json!({}))))
            .unwrap();
        assert!(receiver.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_error_response_fails_native_handle_once() {
        let (mut relay, mut rx) = relay_with_callback();
        let receiver = relay.request_key("2020-03-02");
        let id = delivered_id(&mut rx);

        relay
            .complete(&id, KeyResponse::Error("backend down".into()))
            .unwrap();
        assert!(matches!(
            receiver.await.unwrap(),
            Err(BridgeError::UpstreamError(ref m)) if m == "backend down"
        ));

        // The request is gone, so a repeat completion is a mismatch.
        assert!(matches!(
            relay.complete(&id, KeyResponse::Error("again".into())),
            Err(BridgeError::CorrelationMismatch { expected: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_reset_fails_stranded_request() {
        let (mut relay, mut rx) = relay_with_callback();
        let receiver = relay.request_key("2020-03-02");
        let _ = delivered_id(&mut rx);

        relay.reset(ReleaseReason::ContextCleared);

        assert!(matches!(
            receiver.await.unwrap(),
            Err(BridgeError::Released(ReleaseReason::ContextCleared))
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(CallbackEvent::Released(ReleaseReason::ContextCleared))
        ));
    }

    #[tokio::test]
    async fn test_new_request_supersedes_outstanding_one() {
        let (mut relay, mut rx) = relay_with_callback();
        let first = relay.request_key("2020-03-02");
        let first_id = delivered_id(&mut rx);
        let _second = relay.request_key("2020-03-02");
        let second_id = delivered_id(&mut rx);

        assert_ne!(first_id, second_id);
        assert_eq!(relay.outstanding_id(), Some(&second_id));
        assert!(matches!(
            first.await.unwrap(),
            Err(BridgeError::Released(ReleaseReason::Superseded))
        ));
    }

    #[test]
    fn test_completion_requires_exactly_one_of_response_or_error() {
        let both: KeyCompletion = serde_json::from_value(json!({
            "correlationId": "a", "response": {}, "error": "x"
        }))
        .unwrap();
        assert!(matches!(both.into_response(), Err(BridgeError::InvalidArgument(_))));

        let neither: KeyCompletion =
            serde_json::from_value(json!({ "correlationId": "a" })).unwrap();
        assert!(matches!(neither.into_response(), Err(BridgeError::InvalidArgument(_))));

        let error: KeyCompletion =
            serde_json::from_value(json!({ "correlationId": "a", "error": "x" })).unwrap();
        assert_eq!(
            error.into_response().unwrap(),
            (CorrelationId::from("a"), KeyResponse::Error("x".into()))
        );
    }
}
