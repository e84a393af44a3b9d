use super::amount::Amount;
use super::config::PaymentConfig;
use super::session::PaymentMethod;
use super::wallet::{WalletPaymentRequest, WalletReadinessRequest};
use crate::error::Result;
use async_trait::async_trait;

/// Settings the native payment session is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub config: PaymentConfig,
    /// Configured-enabled AND probed-available.
    pub wallet_enabled: bool,
}

/// The native payment SDK, seen from the bridge.
///
/// Implementations report their delegate events back through the bridge's
/// `on_*` methods. They must not do so from inside one of these calls: the
/// bridge holds its session lock while calling out.
#[async_trait]
pub trait PaymentSdk: Send + Sync {
    /// Starts a customer session whose key provider is the bridge's key relay.
    async fn start_customer_session(&self, publishable_key: &str) -> Result<()>;
    async fn end_customer_session(&self) -> Result<()>;
    async fn create_payment_session(&self, settings: &SessionSettings) -> Result<()>;
    async fn set_cart_total(&self, total: Amount) -> Result<()>;
    async fn clear_payment_method(&self) -> Result<()>;
    async fn present_payment_options(&self) -> Result<()>;
    async fn retry_loading(&self) -> Result<()>;
    /// Tells the SDK how the host's remote confirmation went, closing its
    /// payment-result handshake. Called once per settled confirmation.
    async fn confirm_payment_result(&self, succeeded: bool) -> Result<()>;
    /// Turns the opaque blob returned by the wallet into a payment-method record.
    async fn create_payment_method_from_wallet(
        &self,
        payment_data: &serde_json::Value,
    ) -> Result<PaymentMethod>;
}

/// The OS-mediated wallet subsystem.
#[async_trait]
pub trait WalletClient: Send + Sync {
    async fn is_ready_to_pay(&self, request: &WalletReadinessRequest) -> Result<bool>;
    /// Opens the wallet sheet. The result arrives later through `on_wallet_result`.
    async fn load_payment_data(&self, request: &WalletPaymentRequest) -> Result<()>;
}

/// Persistent storage of the "user prefers wallet pay" flag.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn wallet_preference(&self) -> Result<Option<bool>>;
    async fn store_wallet_preference(&self, use_wallet: bool) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

pub type PaymentSdkBox = Box<dyn PaymentSdk>;
pub type WalletClientBox = Box<dyn WalletClient>;
pub type PreferenceStoreBox = Box<dyn PreferenceStore>;
