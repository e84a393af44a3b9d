use super::key_relay::{EphemeralKeyRelay, KeyCompletion, KeyRequest, NativeKeyReceiver, RelayState};
use super::wallet_bridge::{WalletContinuation, WalletContinuationBridge};
use crate::domain::amount::Amount;
use crate::domain::callback::{CallbackSlot, CorrelationId, HostCallback, ReleaseReason};
use crate::domain::config::{ConfigUpdate, PaymentConfig, WalletProbePolicy};
use crate::domain::ports::{PaymentSdkBox, PreferenceStoreBox, SessionSettings, WalletClientBox};
use crate::domain::session::{
    CurrentOption, CustomerContext, LoadFailure, NativeFinishStatus, NativeSessionState,
    PaymentContext, PaymentCreated, PaymentMethod, PaymentOutcome, SelectedOption, Session,
    SessionPhase,
};
use crate::domain::wallet::{WalletActivityResult, WalletEnvironment, WalletPaymentRequest};
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, oneshot};
use tracing::{debug, info, warn};

/// Arguments of the host's `updateContext` call.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUpdate {
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Arguments of the host's `paymentCreatedCompleted` call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub correlation_id: CorrelationId,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WalletAvailability {
    pub available: bool,
}

#[derive(Debug)]
struct Credential {
    publishable_key: String,
    environment: WalletEnvironment,
}

/// The single in-flight `requestPayment` call.
#[derive(Debug)]
struct PendingPayment {
    correlation_id: CorrelationId,
    /// Set once the method went out through the "payment created" callback.
    delivered: Option<PaymentMethod>,
    completion: oneshot::Sender<Result<PaymentOutcome>>,
}

enum PaymentRoute<'a> {
    Stored(PaymentMethod),
    Wallet {
        bridge: &'a WalletContinuationBridge,
        continuation: WalletContinuation,
        request: WalletPaymentRequest,
    },
}

#[derive(Debug)]
struct BridgeState {
    credential: Option<Credential>,
    config: PaymentConfig,
    session: Session,
    wallet_available: Option<bool>,
    key_relay: EphemeralKeyRelay,
    failed_to_load: CallbackSlot<LoadFailure>,
    changed: CallbackSlot<()>,
    payment_created: CallbackSlot<PaymentCreated>,
    pending_payment: Option<PendingPayment>,
}

impl BridgeState {
    fn new() -> Self {
        Self {
            credential: None,
            config: PaymentConfig::default(),
            session: Session::default(),
            wallet_available: None,
            key_relay: EphemeralKeyRelay::new(),
            failed_to_load: CallbackSlot::new("failed_to_load"),
            changed: CallbackSlot::new("changed"),
            payment_created: CallbackSlot::new("payment_created"),
            pending_payment: None,
        }
    }

    /// Resolves the in-flight payment request if `correlation_id` still names it.
    fn settle_payment(
        &mut self,
        correlation_id: &CorrelationId,
        result: Result<PaymentOutcome>,
    ) -> bool {
        let Some(pending) = self
            .pending_payment
            .take_if(|p| p.correlation_id == *correlation_id)
        else {
            debug!(%correlation_id, "payment request already settled");
            return false;
        };
        match &result {
            Ok(outcome) => info!(%correlation_id, ?outcome, "payment request resolved"),
            Err(e) => warn!(%correlation_id, error = %e, "payment request failed"),
        }
        let _ = pending.completion.send(result);
        true
    }
}

struct Inner {
    state: Mutex<BridgeState>,
    sdk: PaymentSdkBox,
    wallet: Option<WalletContinuationBridge>,
    preferences: PreferenceStoreBox,
    probe_policy: WalletProbePolicy,
}

/// Builds a [`PaymentBridge`] around its external collaborators.
pub struct PaymentBridgeBuilder {
    sdk: PaymentSdkBox,
    preferences: PreferenceStoreBox,
    wallet: Option<WalletClientBox>,
    probe_policy: WalletProbePolicy,
}

impl PaymentBridgeBuilder {
    /// Enables the activity-result wallet path. Platforms without one skip this.
    pub fn wallet(mut self, client: WalletClientBox) -> Self {
        self.wallet = Some(client);
        self
    }

    pub fn probe_policy(mut self, policy: WalletProbePolicy) -> Self {
        self.probe_policy = policy;
        self
    }

    pub fn build(self) -> PaymentBridge {
        PaymentBridge {
            inner: Arc::new(Inner {
                state: Mutex::new(BridgeState::new()),
                sdk: self.sdk,
                wallet: self.wallet.map(WalletContinuationBridge::new),
                preferences: self.preferences,
                probe_policy: self.probe_policy,
            }),
        }
    }
}

/// Coordinates the payment session between the host and the native SDK.
///
/// All session state lives behind one lock, which is the serialization domain
/// for host calls and native events alike. Long waits (the host's key round
/// trip, the wallet sheet, remote confirmation) never hold it: they are
/// parked as one-shot handles that `clear_context` can always settle.
///
/// Cloning is cheap and yields another handle onto the same session.
#[derive(Clone)]
pub struct PaymentBridge {
    inner: Arc<Inner>,
}

impl PaymentBridge {
    /// Starts building a bridge.
    ///
    /// # Arguments
    ///
    /// * `sdk` - The native payment SDK.
    /// * `preferences` - Where the "prefers wallet pay" flag is persisted.
    pub fn builder(sdk: PaymentSdkBox, preferences: PreferenceStoreBox) -> PaymentBridgeBuilder {
        PaymentBridgeBuilder {
            sdk,
            preferences,
            wallet: None,
            probe_policy: WalletProbePolicy::default(),
        }
    }

    async fn lock(&self) -> MutexGuard<'_, BridgeState> {
        self.inner.state.lock().await
    }

    // Host calls

    pub async fn set_credential(&self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "you must provide a valid key".to_string(),
            ));
        }
        let environment = WalletEnvironment::for_publishable_key(key);
        info!(?environment, "credential set");
        self.lock().await.credential = Some(Credential {
            publishable_key: key.to_string(),
            environment,
        });
        Ok(())
    }

    pub async fn set_key_callback(&self, callback: HostCallback<KeyRequest>) {
        self.lock().await.key_relay.set_callback(callback);
    }

    pub async fn key_callback_completed(&self, completion: KeyCompletion) -> Result<()> {
        let (correlation_id, response) = completion.into_response()?;
        self.lock()
            .await
            .key_relay
            .complete(&correlation_id, response)
    }

    /// Merges a partial configuration object. Unknown keys are ignored.
    pub async fn set_configuration(&self, update: serde_json::Value) -> Result<()> {
        let update = ConfigUpdate::from_value(update)?;
        let mut state = self.lock().await;
        state.config.merge(update);
        debug!(config = ?state.config, "configuration updated");
        Ok(())
    }

    pub async fn config(&self) -> PaymentConfig {
        self.lock().await.config.clone()
    }

    /// Creates the customer context if missing, probing wallet availability once.
    pub async fn ensure_customer_context(&self) -> Result<()> {
        let mut state = self.lock().await;
        self.prepare_customer_context(&mut state).await
    }

    /// Creates the payment context on first call, then updates the cart total.
    pub async fn update_context(&self, update: ContextUpdate) -> Result<()> {
        let amount = Amount::from_minor_units(update.amount.unwrap_or(0))?;
        let mut state = self.lock().await;
        self.prepare_customer_context(&mut state).await?;

        if state.session.payment_context.is_none() {
            let wallet_enabled =
                state.config.wallet_enabled && state.wallet_available.unwrap_or(false);
            let settings = SessionSettings {
                config: state.config.clone(),
                wallet_enabled,
            };
            self.inner.sdk.create_payment_session(&settings).await?;
            info!(wallet_enabled, "payment context created");
            state.session.payment_context = Some(PaymentContext {
                wallet_enabled,
                currency: state.config.currency.clone(),
            });
        }
        if let Some(currency) = update.currency
            && let Some(context) = state.session.payment_context.as_mut()
        {
            context.currency = currency;
        }

        self.inner.sdk.set_cart_total(amount).await?;
        state.session.cart_total = amount;
        debug!(amount = amount.minor_units(), "cart total updated");
        Ok(())
    }

    pub async fn set_failed_to_load_callback(&self, callback: HostCallback<LoadFailure>) {
        self.lock().await.failed_to_load.set(callback);
    }

    pub async fn set_changed_callback(&self, callback: HostCallback<()>) {
        self.lock().await.changed.set(callback);
    }

    pub async fn set_payment_created_callback(&self, callback: HostCallback<PaymentCreated>) {
        self.lock().await.payment_created.set(callback);
    }

    /// Produces a payment method and waits until the host confirms it remotely.
    ///
    /// Resolves with [`PaymentOutcome::Cancelled`] when the user backs out.
    pub async fn request_payment(&self) -> Result<PaymentOutcome> {
        let (correlation_id, receiver, route) = self.begin_payment().await?;

        match route {
            PaymentRoute::Stored(method) => {
                self.deliver_payment_created(&correlation_id, method, false)
                    .await;
            }
            PaymentRoute::Wallet {
                bridge,
                continuation,
                request,
            } => {
                let resolved = bridge
                    .resolve_payment_method(continuation, &request, &*self.inner.sdk)
                    .await;
                match resolved {
                    Ok(Some(method)) => {
                        self.deliver_payment_created(&correlation_id, method, true)
                            .await;
                    }
                    Ok(None) => {
                        self.lock()
                            .await
                            .settle_payment(&correlation_id, Ok(PaymentOutcome::Cancelled));
                    }
                    Err(e) => {
                        self.lock().await.settle_payment(&correlation_id, Err(e));
                    }
                }
            }
        }

        receiver
            .await
            .unwrap_or(Err(BridgeError::Released(ReleaseReason::ContextCleared)))
    }

    /// The host's answer to a "payment created" delivery.
    ///
    /// Settles the in-flight request, then reports the outcome to the native
    /// SDK. A failed report is returned to the host; the request stays settled.
    pub async fn payment_created_completed(&self, confirmation: PaymentConfirmation) -> Result<()> {
        let mut state = self.lock().await;
        let delivered = match &state.pending_payment {
            Some(pending) if pending.correlation_id == confirmation.correlation_id => {
                pending.delivered.clone()
            }
            other => {
                return Err(BridgeError::CorrelationMismatch {
                    expected: other.as_ref().map(|p| p.correlation_id.clone()),
                    received: confirmation.correlation_id,
                });
            }
        };
        let Some(payment_method) = delivered else {
            return Err(BridgeError::InvalidState(
                "payment method has not been delivered yet".to_string(),
            ));
        };

        let result = match confirmation.error {
            None => Ok(PaymentOutcome::Completed { payment_method }),
            Some(message) => Err(BridgeError::UpstreamError(message)),
        };
        let succeeded = result.is_ok();
        state.settle_payment(&confirmation.correlation_id, result);
        self.inner.sdk.confirm_payment_result(succeeded).await
    }

    pub async fn current_option(&self) -> CurrentOption {
        self.lock().await.session.current_option()
    }

    pub async fn show_payment_options(&self) -> Result<()> {
        let state = self.lock().await;
        if state.session.payment_context.is_none() {
            return Err(BridgeError::NotConfigured(
                "update the context before showing payment options".to_string(),
            ));
        }
        self.inner.sdk.present_payment_options().await
    }

    pub async fn retry_loading(&self) -> Result<()> {
        let state = self.lock().await;
        if state.session.payment_context.is_none() {
            return Err(BridgeError::NotConfigured(
                "update the context before retrying".to_string(),
            ));
        }
        self.inner.sdk.retry_loading().await
    }

    pub async fn wallet_availability(&self) -> Result<WalletAvailability> {
        let mut state = self.lock().await;
        self.prepare_customer_context(&mut state).await?;
        Ok(WalletAvailability {
            available: state.wallet_available.unwrap_or(false),
        })
    }

    pub async fn phase(&self) -> SessionPhase {
        let state = self.lock().await;
        state.session.phase(state.pending_payment.is_some())
    }

    pub async fn key_relay_state(&self) -> RelayState {
        self.lock().await.key_relay.state()
    }

    /// Tears the session down from any state. Idempotent.
    ///
    /// Every stranded handle is settled and every registered callback released
    /// with [`ReleaseReason::ContextCleared`]. Collaborator failures do not stop
    /// the teardown; the first one is returned once it has finished.
    pub async fn clear_context(&self) -> Result<()> {
        let mut guard = self.lock().await;
        let state = &mut *guard;
        info!("clearing payment context");
        let mut first_error = None;

        if state.session.payment_context.is_some() {
            keep_first(
                &mut first_error,
                self.inner.sdk.set_cart_total(Amount::ZERO).await,
            );
            keep_first(&mut first_error, self.inner.sdk.clear_payment_method().await);
        }

        let reason = ReleaseReason::ContextCleared;
        state.key_relay.reset(reason);
        if let Some(wallet) = &self.inner.wallet {
            wallet.cancel(reason);
        }
        if let Some(pending) = state.pending_payment.take() {
            info!(correlation_id = %pending.correlation_id, "failing in-flight payment request");
            let _ = pending.completion.send(Err(BridgeError::Released(reason)));
        }
        state.failed_to_load.clear(reason);
        state.changed.clear(reason);
        state.payment_created.clear(reason);

        let had_customer_context = state.session.customer_context.is_some();
        state.session = Session::default();
        if self.inner.probe_policy == WalletProbePolicy::PerContextReset {
            state.wallet_available = None;
        }

        keep_first(&mut first_error, self.inner.preferences.clear().await);
        if had_customer_context {
            keep_first(&mut first_error, self.inner.sdk.end_customer_session().await);
        }

        first_error.map_or(Ok(()), Err)
    }

    // Native SDK events

    /// The native SDK needs an ephemeral key; the returned handle settles once.
    pub async fn on_key_requested(&self, api_version: &str) -> NativeKeyReceiver {
        self.lock().await.key_relay.request_key(api_version)
    }

    pub async fn on_loading_changed(&self, is_loading: bool) {
        debug!(is_loading, "native loading state changed");
        self.lock().await.session.loading = is_loading;
    }

    pub async fn on_load_failed(&self, code: i32, message: &str) {
        warn!(code, message, "payment context failed to load");
        let mut state = self.lock().await;
        state.session.loading = false;
        state.failed_to_load.resolve(LoadFailure {
            code,
            error: message.to_string(),
        });
    }

    /// Records the native selection and notifies the "changed" callback.
    ///
    /// A definitive native state is persisted before anything else changes, so
    /// a failed write leaves the selection untouched. An undecided state falls
    /// back to the remembered preference, but only while the payment context
    /// has the wallet enabled.
    pub async fn on_selection_changed(&self, native: NativeSessionState) -> Result<()> {
        let mut state = self.lock().await;
        if !native.is_undecided() {
            self.inner
                .preferences
                .store_wallet_preference(native.use_wallet)
                .await?;
            state.session.last_wallet_preference = native.use_wallet;
        }
        state.session.loading = native.is_loading;

        let wallet_enabled = state
            .session
            .payment_context
            .as_ref()
            .is_some_and(|c| c.wallet_enabled);
        let use_wallet = if native.is_undecided() {
            state.session.last_wallet_preference && wallet_enabled
        } else {
            native.use_wallet
        };

        let selected = match native.payment_method {
            _ if use_wallet => SelectedOption::WalletPay,
            Some(method) => SelectedOption::StoredPaymentMethod(method),
            None => SelectedOption::NoSelection,
        };
        info!(use_wallet, wallet_enabled, ?selected, "payment selection changed");
        state.session.selected_option = Some(selected);
        state.changed.resolve(());
        Ok(())
    }

    pub async fn on_payment_finished(&self, status: NativeFinishStatus) {
        let mut state = self.lock().await;
        let Some(correlation_id) = state
            .pending_payment
            .as_ref()
            .map(|p| p.correlation_id.clone())
        else {
            debug!(?status, "payment finished with no request in flight");
            return;
        };

        let result = match status {
            NativeFinishStatus::Success => {
                debug!(%correlation_id, "native flow succeeded, awaiting host confirmation");
                return;
            }
            NativeFinishStatus::UserCancellation => Ok(PaymentOutcome::Cancelled),
            NativeFinishStatus::Error { message } => Err(BridgeError::UpstreamError(message)),
        };
        if let Some(wallet) = &self.inner.wallet {
            wallet.cancel(ReleaseReason::Superseded);
        }
        state.settle_payment(&correlation_id, result);
    }

    /// The OS delivered the wallet sheet's result. Stale results are ignored.
    pub fn on_wallet_result(&self, result: WalletActivityResult) -> bool {
        match &self.inner.wallet {
            Some(wallet) => wallet.resume(result),
            None => {
                warn!("wallet result arrived but no wallet is configured");
                false
            }
        }
    }

    async fn prepare_customer_context(&self, state: &mut BridgeState) -> Result<()> {
        if state.session.customer_context.is_some() {
            return Ok(());
        }
        let (publishable_key, environment) = match &state.credential {
            Some(c) => (c.publishable_key.clone(), c.environment),
            None => {
                return Err(BridgeError::NotConfigured(
                    "set a credential before creating a customer context".to_string(),
                ));
            }
        };

        self.inner.sdk.start_customer_session(&publishable_key).await?;
        if state.wallet_available.is_none()
            && let Some(wallet) = &self.inner.wallet
        {
            state.wallet_available = Some(wallet.probe_availability(environment).await);
        }
        state.session.last_wallet_preference = self
            .inner
            .preferences
            .wallet_preference()
            .await?
            .unwrap_or(false);
        state.session.cart_total = Amount::ZERO;
        state.session.customer_context = Some(CustomerContext { environment });
        info!(?environment, "customer context created");
        Ok(())
    }

    async fn begin_payment(
        &self,
    ) -> Result<(
        CorrelationId,
        oneshot::Receiver<Result<PaymentOutcome>>,
        PaymentRoute<'_>,
    )> {
        let mut state = self.lock().await;
        if state.pending_payment.is_some() {
            return Err(BridgeError::InvalidState(
                "a payment request is already in flight".to_string(),
            ));
        }
        let selected = state.session.selected_option.clone().ok_or_else(|| {
            BridgeError::NoActiveSelection(
                "update the context before requesting payment".to_string(),
            )
        })?;

        let route = match selected {
            SelectedOption::NoSelection => {
                return Err(BridgeError::NoActiveSelection(
                    "no payment method selected".to_string(),
                ));
            }
            SelectedOption::StoredPaymentMethod(method) => PaymentRoute::Stored(method),
            SelectedOption::WalletPay => {
                let wallet_enabled = state
                    .session
                    .payment_context
                    .as_ref()
                    .is_some_and(|c| c.wallet_enabled);
                if !wallet_enabled {
                    return Err(BridgeError::NotConfigured(
                        "wallet is not enabled for this payment context".to_string(),
                    ));
                }
                let bridge = self.inner.wallet.as_ref().ok_or_else(|| {
                    BridgeError::NotConfigured("no wallet is available on this platform".to_string())
                })?;
                let credential = state.credential.as_ref().ok_or_else(|| {
                    BridgeError::NotConfigured("set a credential before paying".to_string())
                })?;
                let currency = state
                    .session
                    .payment_context
                    .as_ref()
                    .map_or(&state.config.currency, |c| &c.currency);
                let request = WalletPaymentRequest::new(
                    state.session.cart_total,
                    currency,
                    &state.config.company_name,
                    &credential.publishable_key,
                    credential.environment,
                );
                let continuation = bridge.suspend()?;
                PaymentRoute::Wallet {
                    bridge,
                    continuation,
                    request,
                }
            }
        };

        let correlation_id = CorrelationId::generate();
        let (completion, receiver) = oneshot::channel();
        info!(%correlation_id, "payment requested");
        state.pending_payment = Some(PendingPayment {
            correlation_id: correlation_id.clone(),
            delivered: None,
            completion,
        });
        Ok((correlation_id, receiver, route))
    }

    async fn deliver_payment_created(
        &self,
        correlation_id: &CorrelationId,
        payment_method: PaymentMethod,
        used_wallet: bool,
    ) {
        let mut state = self.lock().await;
        let Some(pending) = state
            .pending_payment
            .as_mut()
            .filter(|p| p.correlation_id == *correlation_id)
        else {
            debug!(%correlation_id, "payment request settled before delivery");
            return;
        };
        pending.delivered = Some(payment_method.clone());

        let event = PaymentCreated {
            correlation_id: correlation_id.clone(),
            payment_method,
            used_wallet,
        };
        if !state.payment_created.resolve(event) {
            state.settle_payment(
                correlation_id,
                Err(BridgeError::NotConfigured(
                    "no payment created callback registered".to_string(),
                )),
            );
        }
    }
}

fn keep_first(first: &mut Option<BridgeError>, result: Result<()>) {
    if let Err(e) = result {
        warn!(error = %e, "teardown step failed");
        first.get_or_insert(e);
    }
}
