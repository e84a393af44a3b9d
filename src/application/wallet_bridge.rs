use crate::domain::callback::ReleaseReason;
use crate::domain::ports::{PaymentSdk, WalletClientBox};
use crate::domain::session::PaymentMethod;
use crate::domain::wallet::{
    WalletActivityResult, WalletEnvironment, WalletPaymentRequest, WalletReadinessRequest,
};
use crate::error::{BridgeError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// The single outstanding wallet continuation, consumed exactly once.
#[derive(Debug)]
struct WalletPendingResult {
    token: u64,
    resume: oneshot::Sender<Result<WalletActivityResult>>,
}

/// Handle held by the suspended flow until the wallet result arrives.
#[derive(Debug)]
pub struct WalletContinuation {
    token: u64,
    receiver: oneshot::Receiver<Result<WalletActivityResult>>,
}

/// Turns the wallet's OS-delivered activity result into an awaitable answer.
///
/// Only one flow may be suspended at a time. Results that arrive with nothing
/// suspended (for example after `clearContext`) are dropped.
pub struct WalletContinuationBridge {
    client: WalletClientBox,
    pending: Mutex<Option<WalletPendingResult>>,
    next_token: AtomicU64,
}

impl WalletContinuationBridge {
    pub fn new(client: WalletClientBox) -> Self {
        Self {
            client,
            pending: Mutex::new(None),
            next_token: AtomicU64::new(1),
        }
    }

    /// Asks the wallet whether it can pay. A failed probe counts as unavailable.
    pub async fn probe_availability(&self, environment: WalletEnvironment) -> bool {
        match self
            .client
            .is_ready_to_pay(&WalletReadinessRequest::new(environment))
            .await
        {
            Ok(ready) => {
                info!(ready, ?environment, "wallet availability probed");
                ready
            }
            Err(e) => {
                warn!(error = %e, "wallet availability probe failed");
                false
            }
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.lock().is_some()
    }

    /// Reserves the continuation slot. Fails if a flow is already suspended.
    pub fn suspend(&self) -> Result<WalletContinuation> {
        let mut pending = self.lock();
        if pending.is_some() {
            return Err(BridgeError::InvalidState(
                "a wallet payment is already awaiting its result".to_string(),
            ));
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (resume, receiver) = oneshot::channel();
        *pending = Some(WalletPendingResult { token, resume });
        debug!(token, "wallet continuation suspended");
        Ok(WalletContinuation { token, receiver })
    }

    /// Hands `request` to the wallet and waits for its result.
    ///
    /// Resolves to `None` when the user cancelled the wallet sheet. A
    /// continuation that was settled before the hand-off never opens the sheet.
    pub async fn resolve_payment_method(
        &self,
        continuation: WalletContinuation,
        request: &WalletPaymentRequest,
        sdk: &dyn PaymentSdk,
    ) -> Result<Option<PaymentMethod>> {
        let WalletContinuation {
            token,
            mut receiver,
        } = continuation;
        let still_pending = self.lock().as_ref().is_some_and(|p| p.token == token);

        let result = if still_pending {
            info!(
                total = %request.transaction_info.total_price,
                currency = %request.transaction_info.currency_code,
                "handing payment to wallet"
            );
            if let Err(e) = self.client.load_payment_data(request).await {
                self.abandon(token);
                return Err(e);
            }
            receiver
                .await
                .unwrap_or(Err(BridgeError::Released(ReleaseReason::ContextCleared)))?
        } else {
            debug!(token, "wallet continuation settled before hand-off");
            receiver
                .try_recv()
                .unwrap_or(Err(BridgeError::Released(ReleaseReason::ContextCleared)))?
        };

        match result {
            WalletActivityResult::Success { payment_data } => sdk
                .create_payment_method_from_wallet(&payment_data)
                .await
                .map(Some)
                .map_err(|e| match e {
                    BridgeError::UpstreamError(_) => e,
                    other => BridgeError::UpstreamError(format!(
                        "unable to create payment method from wallet result: {other}"
                    )),
                }),
            WalletActivityResult::Cancelled => {
                info!("wallet sheet cancelled by user");
                Ok(None)
            }
            WalletActivityResult::Error { status_code } => Err(BridgeError::UpstreamError(
                format!("Error invoking wallet: status {status_code}"),
            )),
        }
    }

    /// Delivers the OS result to the suspended flow. Returns whether one was waiting.
    pub fn resume(&self, result: WalletActivityResult) -> bool {
        match self.lock().take() {
            Some(pending) => {
                debug!(token = pending.token, "resuming wallet continuation");
                if pending.resume.send(Ok(result)).is_err() {
                    debug!(token = pending.token, "suspended wallet flow is gone");
                }
                true
            }
            None => {
                warn!("wallet result arrived with no suspended flow, ignoring");
                false
            }
        }
    }

    /// Fails the suspended flow, if any, with a release signal.
    pub fn cancel(&self, reason: ReleaseReason) -> bool {
        match self.lock().take() {
            Some(pending) => {
                info!(token = pending.token, %reason, "cancelling wallet continuation");
                let _ = pending.resume.send(Err(BridgeError::Released(reason)));
                true
            }
            None => false,
        }
    }

    fn abandon(&self, token: u64) {
        let mut pending = self.lock();
        if pending.as_ref().is_some_and(|p| p.token == token) {
            *pending = None;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<WalletPendingResult>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::amount::Amount;
    use crate::infrastructure::simulated::{SimulatedPaymentSdk, SimulatedWalletClient};
    use serde_json::json;
    use std::sync::Arc;

    fn request() -> WalletPaymentRequest {
        WalletPaymentRequest::new(
            Amount::from_minor_units(1050).unwrap(),
            "USD",
            "Acme",
            "pk_test_1",
            WalletEnvironment::Test,
        )
    }

    fn bridge(client: &SimulatedWalletClient) -> Arc<WalletContinuationBridge> {
        Arc::new(WalletContinuationBridge::new(Box::new(client.clone())))
    }

    async fn wait_until_suspended(bridge: &WalletContinuationBridge, client: &SimulatedWalletClient) {
        while client.requests().is_empty() || !bridge.is_suspended() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_second_suspension_fails_fast() {
        let client = SimulatedWalletClient::new(true);
        let bridge = bridge(&client);

        let _first = bridge.suspend().unwrap();
        assert!(matches!(
            bridge.suspend(),
            Err(BridgeError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_success_converts_payment_data() {
        let client = SimulatedWalletClient::new(true);
        let sdk = SimulatedPaymentSdk::new();
        let bridge = bridge(&client);

        let continuation = bridge.suspend().unwrap();
        let flow = {
            let bridge = Arc::clone(&bridge);
            let sdk = sdk.clone();
            tokio::spawn(async move {
                bridge
                    .resolve_payment_method(continuation, &request(), &sdk)
                    .await
            })
        };
        wait_until_suspended(&bridge, &client).await;

        assert!(bridge.resume(WalletActivityResult::Success {
            payment_data: json!({
                "paymentMethodData": { "info": { "cardNetwork": "VISA", "cardDetails": "1111" } }
            }),
        }));

        let method = flow.await.unwrap().unwrap().unwrap();
        assert_eq!(method.label(), "VISA 1111");
        assert!(!bridge.is_suspended());
    }

    #[tokio::test]
    async fn test_cancel_resolves_to_none_and_error_carries_status() {
        let client = SimulatedWalletClient::new(true);
        let sdk = SimulatedPaymentSdk::new();
        let bridge = bridge(&client);

        let continuation = bridge.suspend().unwrap();
        bridge.resume(WalletActivityResult::Cancelled);
        let outcome = bridge
            .resolve_payment_method(continuation, &request(), &sdk)
            .await
            .unwrap();
        assert!(outcome.is_none());

        let continuation = bridge.suspend().unwrap();
        bridge.resume(WalletActivityResult::Error { status_code: 8 });
        let err = bridge
            .resolve_payment_method(continuation, &request(), &sdk)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UpstreamError(ref m) if m.contains("status 8")));
    }

    #[tokio::test]
    async fn test_conversion_failure_is_upstream_error() {
        let client = SimulatedWalletClient::new(true);
        let sdk = SimulatedPaymentSdk::new();
        sdk.fail_wallet_conversion(true);
        let bridge = bridge(&client);

        let continuation = bridge.suspend().unwrap();
        bridge.resume(WalletActivityResult::Success {
            payment_data: json!({}),
        });
        let err = bridge
            .resolve_payment_method(continuation, &request(), &sdk)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UpstreamError(_)));
    }

    #[tokio::test]
    async fn test_stale_resume_is_ignored() {
        let client = SimulatedWalletClient::new(true);
        let bridge = bridge(&client);

        assert!(!bridge.resume(WalletActivityResult::Cancelled));
        assert!(!bridge.is_suspended());
    }

    #[tokio::test]
    async fn test_cancel_releases_suspended_flow() {
        let client = SimulatedWalletClient::new(true);
        let sdk = SimulatedPaymentSdk::new();
        let bridge = bridge(&client);

        let continuation = bridge.suspend().unwrap();
        assert!(bridge.cancel(ReleaseReason::ContextCleared));
        let err = bridge
            .resolve_payment_method(continuation, &request(), &sdk)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Released(ReleaseReason::ContextCleared)
        ));

        // Nothing suspended anymore, so a late OS result is dropped.
        assert!(!bridge.resume(WalletActivityResult::Cancelled));
    }

    #[tokio::test]
    async fn test_released_continuation_never_opens_wallet_sheet() {
        let client = SimulatedWalletClient::new(true);
        let sdk = SimulatedPaymentSdk::new();
        let bridge = bridge(&client);

        let continuation = bridge.suspend().unwrap();
        assert!(bridge.cancel(ReleaseReason::Superseded));
        let err = bridge
            .resolve_payment_method(continuation, &request(), &sdk)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Released(ReleaseReason::Superseded)));
        assert!(client.requests().is_empty());
        assert!(sdk.calls().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_continuation_reports_context_cleared() {
        let client = SimulatedWalletClient::new(true);
        let sdk = SimulatedPaymentSdk::new();
        let bridge = bridge(&client);

        let continuation = bridge.suspend().unwrap();
        bridge.abandon(continuation.token);
        let err = bridge
            .resolve_payment_method(continuation, &request(), &sdk)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BridgeError::Released(ReleaseReason::ContextCleared)
        ));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_handoff_failure_frees_the_slot() {
        let client = SimulatedWalletClient::new(true);
        client.fail_load(true);
        let sdk = SimulatedPaymentSdk::new();
        let bridge = bridge(&client);

        let continuation = bridge.suspend().unwrap();
        assert!(
            bridge
                .resolve_payment_method(continuation, &request(), &sdk)
                .await
                .is_err()
        );
        assert!(!bridge.is_suspended());
    }

    #[tokio::test]
    async fn test_probe_failure_counts_as_unavailable() {
        let client = SimulatedWalletClient::new(true);
        client.fail_probe(true);
        let bridge = bridge(&client);
        assert!(!bridge.probe_availability(WalletEnvironment::Test).await);
    }
}
