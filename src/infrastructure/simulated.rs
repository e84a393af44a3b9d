//! Scriptable stand-ins for the native payment SDK and the wallet subsystem.
//!
//! They record every call so tests and the scenario runner can inspect what the
//! bridge asked for. Neither ever calls back into the bridge on its own.

use crate::domain::amount::Amount;
use crate::domain::ports::{PaymentSdk, SessionSettings, WalletClient};
use crate::domain::session::{CardDetails, PaymentMethod};
use crate::domain::wallet::{WalletPaymentRequest, WalletReadinessRequest};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq)]
pub enum SdkCall {
    StartCustomerSession(String),
    EndCustomerSession,
    CreatePaymentSession(SessionSettings),
    SetCartTotal(Amount),
    ClearPaymentMethod,
    PresentPaymentOptions,
    RetryLoading,
    ConfirmPaymentResult(bool),
    CreatePaymentMethodFromWallet(serde_json::Value),
}

#[derive(Default, Clone)]
pub struct SimulatedPaymentSdk {
    calls: Arc<Mutex<Vec<SdkCall>>>,
    fail_wallet_conversion: Arc<AtomicBool>,
    created_methods: Arc<AtomicUsize>,
}

impl SimulatedPaymentSdk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SdkCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fail_wallet_conversion(&self, fail: bool) {
        self.fail_wallet_conversion.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: SdkCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

#[async_trait]
impl PaymentSdk for SimulatedPaymentSdk {
    async fn start_customer_session(&self, publishable_key: &str) -> Result<()> {
        self.record(SdkCall::StartCustomerSession(publishable_key.to_string()));
        Ok(())
    }

    async fn end_customer_session(&self) -> Result<()> {
        self.record(SdkCall::EndCustomerSession);
        Ok(())
    }

    async fn create_payment_session(&self, settings: &SessionSettings) -> Result<()> {
        self.record(SdkCall::CreatePaymentSession(settings.clone()));
        Ok(())
    }

    async fn set_cart_total(&self, total: Amount) -> Result<()> {
        self.record(SdkCall::SetCartTotal(total));
        Ok(())
    }

    async fn clear_payment_method(&self) -> Result<()> {
        self.record(SdkCall::ClearPaymentMethod);
        Ok(())
    }

    async fn present_payment_options(&self) -> Result<()> {
        self.record(SdkCall::PresentPaymentOptions);
        Ok(())
    }

    async fn retry_loading(&self) -> Result<()> {
        self.record(SdkCall::RetryLoading);
        Ok(())
    }

    async fn confirm_payment_result(&self, succeeded: bool) -> Result<()> {
        self.record(SdkCall::ConfirmPaymentResult(succeeded));
        Ok(())
    }

    async fn create_payment_method_from_wallet(
        &self,
        payment_data: &serde_json::Value,
    ) -> Result<PaymentMethod> {
        self.record(SdkCall::CreatePaymentMethodFromWallet(payment_data.clone()));
        if self.fail_wallet_conversion.load(Ordering::SeqCst) {
            return Err(BridgeError::UpstreamError(
                "payment method creation was declined".to_string(),
            ));
        }

        let info = &payment_data["paymentMethodData"]["info"];
        let card = match (info["cardNetwork"].as_str(), info["cardDetails"].as_str()) {
            (None, None) => None,
            (brand, last4) => Some(CardDetails {
                brand: brand.unwrap_or_default().to_string(),
                last4: last4.unwrap_or_default().to_string(),
            }),
        };
        let n = self.created_methods.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentMethod {
            id: format!("pm_wallet_{n}"),
            card,
        })
    }
}

#[derive(Clone)]
pub struct SimulatedWalletClient {
    ready: Arc<AtomicBool>,
    fail_probe: Arc<AtomicBool>,
    fail_load: Arc<AtomicBool>,
    probes: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<WalletPaymentRequest>>>,
}

impl SimulatedWalletClient {
    pub fn new(ready: bool) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(ready)),
            fail_probe: Arc::new(AtomicBool::new(false)),
            fail_load: Arc::new(AtomicBool::new(false)),
            probes: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn fail_probe(&self, fail: bool) {
        self.fail_probe.store(fail, Ordering::SeqCst);
    }

    pub fn fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Every payment request handed to the wallet sheet, oldest first.
    pub fn requests(&self) -> Vec<WalletPaymentRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl WalletClient for SimulatedWalletClient {
    async fn is_ready_to_pay(&self, _request: &WalletReadinessRequest) -> Result<bool> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.fail_probe.load(Ordering::SeqCst) {
            return Err(BridgeError::UpstreamError(
                "wallet service unreachable".to_string(),
            ));
        }
        Ok(self.ready.load(Ordering::SeqCst))
    }

    async fn load_payment_data(&self, request: &WalletPaymentRequest) -> Result<()> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(BridgeError::UpstreamError(
                "wallet sheet could not be opened".to_string(),
            ));
        }
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_wallet_conversion_reads_card_info() {
        let sdk = SimulatedPaymentSdk::new();
        let method = sdk
            .create_payment_method_from_wallet(&json!({
                "paymentMethodData": { "info": { "cardNetwork": "MASTERCARD", "cardDetails": "4444" } }
            }))
            .await
            .unwrap();

        assert_eq!(method.id, "pm_wallet_1");
        assert_eq!(method.label(), "MASTERCARD 4444");
        assert_eq!(sdk.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_wallet_conversion_without_card_info() {
        let sdk = SimulatedPaymentSdk::new();
        let method = sdk
            .create_payment_method_from_wallet(&json!({}))
            .await
            .unwrap();
        assert!(method.card.is_none());
    }
}
