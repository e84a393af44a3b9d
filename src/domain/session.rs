use super::amount::Amount;
use super::callback::CorrelationId;
use super::wallet::WalletEnvironment;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Label reported by `currentOption` when the wallet is the effective selection.
pub const WALLET_PAY_LABEL: &str = "Wallet Pay";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub last4: String,
}

/// A payment-method record as produced by the native SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<CardDetails>,
}

impl PaymentMethod {
    /// `"<brand> <last4>"`, with empty segments left out.
    pub fn label(&self) -> String {
        let Some(card) = &self.card else {
            return String::new();
        };
        [card.brand.trim(), card.last4.trim()]
            .into_iter()
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectedOption {
    NoSelection,
    WalletPay,
    StoredPaymentMethod(PaymentMethod),
}

/// Selection state as reported by the native SDK's change listener.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeSessionState {
    #[serde(default)]
    pub is_loading: bool,
    #[serde(default)]
    pub use_wallet: bool,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

impl NativeSessionState {
    /// True when the SDK reports neither a stored method nor an explicit wallet choice.
    pub fn is_undecided(&self) -> bool {
        !self.use_wallet && self.payment_method.is_none()
    }
}

/// Answer to `currentOption`: `{loading: true}`, `{label}` or `{}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentOption {
    Loading,
    Label(String),
    Empty,
}

impl Serialize for CurrentOption {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            CurrentOption::Loading => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("loading", &true)?;
                map.end()
            }
            CurrentOption::Label(label) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("label", label)?;
                map.end()
            }
            CurrentOption::Empty => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

/// Final answer to a `requestPayment` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum PaymentOutcome {
    #[serde(rename_all = "camelCase")]
    Completed { payment_method: PaymentMethod },
    Cancelled,
}

impl PaymentOutcome {
    pub fn payment_method(&self) -> Option<&PaymentMethod> {
        match self {
            PaymentOutcome::Completed { payment_method } => Some(payment_method),
            PaymentOutcome::Cancelled => None,
        }
    }
}

/// Delivered through the "payment created" callback; the host confirms it remotely
/// and answers with `paymentCreatedCompleted` carrying the same correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCreated {
    pub correlation_id: CorrelationId,
    pub payment_method: PaymentMethod,
    pub used_wallet: bool,
}

/// Delivered through the "failed to load" callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    pub code: i32,
    pub error: String,
}

/// How the native SDK says a payment flow ended.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum NativeFinishStatus {
    Success,
    UserCancellation,
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerContext {
    pub environment: WalletEnvironment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentContext {
    /// Configured-enabled AND probed-available, fixed when the context was created.
    pub wallet_enabled: bool,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Uninitialized,
    ContextReady,
    Loading,
    Ready,
    RequestingPayment,
}

/// Everything the coordinator knows about the current payment session.
#[derive(Debug, Default)]
pub struct Session {
    pub customer_context: Option<CustomerContext>,
    pub payment_context: Option<PaymentContext>,
    pub cart_total: Amount,
    /// `None` until the native SDK has reported a selection at least once.
    pub selected_option: Option<SelectedOption>,
    pub last_wallet_preference: bool,
    pub loading: bool,
}

impl Session {
    pub fn phase(&self, payment_in_flight: bool) -> SessionPhase {
        if self.customer_context.is_none() {
            SessionPhase::Uninitialized
        } else if payment_in_flight {
            SessionPhase::RequestingPayment
        } else if self.loading {
            SessionPhase::Loading
        } else if self.selected_option.is_some() {
            SessionPhase::Ready
        } else {
            SessionPhase::ContextReady
        }
    }

    pub fn current_option(&self) -> CurrentOption {
        if self.loading {
            return CurrentOption::Loading;
        }
        match &self.selected_option {
            Some(SelectedOption::WalletPay) => CurrentOption::Label(WALLET_PAY_LABEL.to_string()),
            Some(SelectedOption::StoredPaymentMethod(method)) => {
                CurrentOption::Label(method.label())
            }
            Some(SelectedOption::NoSelection) | None => CurrentOption::Empty,
        }
    }
}
