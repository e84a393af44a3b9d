use crate::domain::callback::CorrelationId;
use crate::domain::session::{NativeFinishStatus, NativeSessionState};
use crate::domain::wallet::WalletActivityResult;
use serde::Deserialize;

/// One line of a scenario script.
///
/// Host calls and native SDK events share one namespace, keyed by `op`.
/// Correlation ids may be omitted; the runner then answers the most recent
/// request it saw.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ScriptStep {
    SetCredential {
        key: String,
    },
    SetKeyCallback,
    #[serde(rename_all = "camelCase")]
    KeyCallbackCompleted {
        #[serde(default)]
        correlation_id: Option<CorrelationId>,
        #[serde(default)]
        response: Option<serde_json::Value>,
        #[serde(default)]
        error: Option<String>,
    },
    SetConfiguration {
        config: serde_json::Value,
    },
    UpdateContext {
        #[serde(default)]
        amount: Option<i64>,
        #[serde(default)]
        currency: Option<String>,
    },
    SetFailedToLoadCallback,
    SetChangedCallback,
    SetPaymentCreatedCallback,
    RequestPayment,
    #[serde(rename_all = "camelCase")]
    PaymentCreatedCompleted {
        #[serde(default)]
        correlation_id: Option<CorrelationId>,
        #[serde(default)]
        error: Option<String>,
    },
    CurrentOption,
    ClearContext,
    ShowPaymentOptions,
    RetryLoading,
    WalletAvailability,
    Phase,

    #[serde(rename_all = "camelCase")]
    KeyRequested {
        api_version: String,
    },
    #[serde(rename_all = "camelCase")]
    LoadingChanged {
        is_loading: bool,
    },
    LoadFailed {
        code: i32,
        message: String,
    },
    SelectionChanged {
        #[serde(default)]
        state: NativeSessionState,
    },
    PaymentFinished {
        result: NativeFinishStatus,
    },
    WalletResult {
        result: WalletActivityResult,
    },
}

impl ScriptStep {
    /// The `op` name, used to label call results.
    pub fn name(&self) -> &'static str {
        match self {
            ScriptStep::SetCredential { .. } => "setCredential",
            ScriptStep::SetKeyCallback => "setKeyCallback",
            ScriptStep::KeyCallbackCompleted { .. } => "keyCallbackCompleted",
            ScriptStep::SetConfiguration { .. } => "setConfiguration",
            ScriptStep::UpdateContext { .. } => "updateContext",
            ScriptStep::SetFailedToLoadCallback => "setFailedToLoadCallback",
            ScriptStep::SetChangedCallback => "setChangedCallback",
            ScriptStep::SetPaymentCreatedCallback => "setPaymentCreatedCallback",
            ScriptStep::RequestPayment => "requestPayment",
            ScriptStep::PaymentCreatedCompleted { .. } => "paymentCreatedCompleted",
            ScriptStep::CurrentOption => "currentOption",
            ScriptStep::ClearContext => "clearContext",
            ScriptStep::ShowPaymentOptions => "showPaymentOptions",
            ScriptStep::RetryLoading => "retryLoading",
            ScriptStep::WalletAvailability => "walletAvailability",
            ScriptStep::Phase => "phase",
            ScriptStep::KeyRequested { .. } => "keyRequested",
            ScriptStep::LoadingChanged { .. } => "loadingChanged",
            ScriptStep::LoadFailed { .. } => "loadFailed",
            ScriptStep::SelectionChanged { .. } => "selectionChanged",
            ScriptStep::PaymentFinished { .. } => "paymentFinished",
            ScriptStep::WalletResult { .. } => "walletResult",
        }
    }
}
