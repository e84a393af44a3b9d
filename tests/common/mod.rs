#![allow(dead_code)]

use paybridge::application::coordinator::{ContextUpdate, PaymentBridge};
use paybridge::domain::callback::{CallbackEvent, CallbackReceiver};
use paybridge::domain::config::WalletProbePolicy;
use paybridge::domain::session::{CardDetails, NativeSessionState, PaymentMethod};
use paybridge::infrastructure::in_memory::InMemoryPreferenceStore;
use paybridge::infrastructure::simulated::{SimulatedPaymentSdk, SimulatedWalletClient};
use serde_json::json;
use std::time::Duration;

pub const TEST_KEY: &str = "pk_test_123";

/// A bridge wired to simulated collaborators, with handles kept for inspection.
pub struct Harness {
    pub bridge: PaymentBridge,
    pub sdk: SimulatedPaymentSdk,
    pub wallet: SimulatedWalletClient,
    pub preferences: InMemoryPreferenceStore,
}

pub fn harness() -> Harness {
    build_harness(true, InMemoryPreferenceStore::new(), WalletProbePolicy::default())
}

pub fn build_harness(
    wallet_ready: bool,
    preferences: InMemoryPreferenceStore,
    policy: WalletProbePolicy,
) -> Harness {
    let sdk = SimulatedPaymentSdk::new();
    let wallet = SimulatedWalletClient::new(wallet_ready);
    let bridge = PaymentBridge::builder(Box::new(sdk.clone()), Box::new(preferences.clone()))
        .wallet(Box::new(wallet.clone()))
        .probe_policy(policy)
        .build();
    Harness {
        bridge,
        sdk,
        wallet,
        preferences,
    }
}

impl Harness {
    /// Wallet enabled in the configuration, credential set, context created
    /// with `amount`.
    pub async fn ready(&self, amount: i64) {
        self.bridge
            .set_configuration(json!({"walletEnabled": true}))
            .await
            .unwrap();
        self.bridge.set_credential(TEST_KEY).await.unwrap();
        self.bridge
            .update_context(ContextUpdate {
                amount: Some(amount),
                currency: None,
            })
            .await
            .unwrap();
    }

    pub async fn select_stored(&self, method: PaymentMethod) {
        self.bridge
            .on_selection_changed(NativeSessionState {
                payment_method: Some(method),
                ..NativeSessionState::default()
            })
            .await
            .unwrap();
    }

    pub async fn select_wallet(&self) {
        self.bridge
            .on_selection_changed(NativeSessionState {
                use_wallet: true,
                ..NativeSessionState::default()
            })
            .await
            .unwrap();
    }

    /// Waits until the wallet sheet has been handed `count` requests.
    pub async fn wait_for_wallet_requests(&self, count: usize) {
        eventually(|| self.wallet.requests().len() >= count).await;
    }
}

pub fn visa() -> PaymentMethod {
    PaymentMethod {
        id: "pm_visa".to_string(),
        card: Some(CardDetails {
            brand: "Visa".to_string(),
            last4: "4242".to_string(),
        }),
    }
}

pub async fn next_event<T>(receiver: &mut CallbackReceiver<T>) -> CallbackEvent<T> {
    tokio::time::timeout(Duration::from_secs(5), receiver.recv())
        .await
        .expect("timed out waiting for callback event")
        .expect("callback channel closed without an event")
}

pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}
