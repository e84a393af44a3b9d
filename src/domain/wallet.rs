//! Descriptors exchanged with the OS-mediated wallet subsystem.
//!
//! Requests serialize to the wallet's JSON request format (API version 2.0).

use super::amount::Amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const WALLET_API_VERSION: u8 = 2;
pub const WALLET_API_VERSION_MINOR: u8 = 0;
pub const ALLOWED_CARD_NETWORKS: &[&str] = &["AMEX", "DISCOVER", "JCB", "MASTERCARD", "VISA"];
pub const ALLOWED_AUTH_METHODS: &[&str] = &["PAN_ONLY", "CRYPTOGRAM_3DS"];
pub const TOKENIZATION_GATEWAY: &str = "stripe";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletEnvironment {
    Test,
    Production,
}

impl WalletEnvironment {
    /// Test keys select the wallet's test environment.
    pub fn for_publishable_key(key: &str) -> Self {
        if key.contains("test") {
            Self::Test
        } else {
            Self::Production
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardParameters {
    pub allowed_auth_methods: Vec<String>,
    pub allowed_card_networks: Vec<String>,
    pub billing_address_required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenizationSpecification {
    #[serde(rename = "type")]
    pub kind: String,
    pub parameters: BTreeMap<String, String>,
}

impl TokenizationSpecification {
    pub fn gateway(publishable_key: &str) -> Self {
        let parameters = BTreeMap::from([
            ("gateway".to_string(), TOKENIZATION_GATEWAY.to_string()),
            (
                format!("{TOKENIZATION_GATEWAY}:publishableKey"),
                publishable_key.to_string(),
            ),
        ]);
        Self {
            kind: "PAYMENT_GATEWAY".to_string(),
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPaymentMethod {
    #[serde(rename = "type")]
    pub kind: String,
    pub parameters: CardParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokenization_specification: Option<TokenizationSpecification>,
}

impl Default for CardPaymentMethod {
    fn default() -> Self {
        Self {
            kind: "CARD".to_string(),
            parameters: CardParameters {
                allowed_auth_methods: ALLOWED_AUTH_METHODS.iter().map(|s| s.to_string()).collect(),
                allowed_card_networks: ALLOWED_CARD_NETWORKS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                billing_address_required: false,
            },
            tokenization_specification: None,
        }
    }
}

/// Asks the wallet whether it can pay at all on this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletReadinessRequest {
    pub api_version: u8,
    pub api_version_minor: u8,
    pub allowed_payment_methods: Vec<CardPaymentMethod>,
    #[serde(skip)]
    pub environment: WalletEnvironment,
}

impl WalletReadinessRequest {
    pub fn new(environment: WalletEnvironment) -> Self {
        Self {
            api_version: WALLET_API_VERSION,
            api_version_minor: WALLET_API_VERSION_MINOR,
            allowed_payment_methods: vec![CardPaymentMethod::default()],
            environment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    pub total_price: String,
    pub total_price_status: String,
    pub currency_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantInfo {
    pub merchant_name: String,
}

/// The request handed to the wallet sheet when paying with the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletPaymentRequest {
    pub api_version: u8,
    pub api_version_minor: u8,
    pub transaction_info: TransactionInfo,
    pub merchant_info: MerchantInfo,
    pub allowed_payment_methods: Vec<CardPaymentMethod>,
    pub email_required: bool,
    #[serde(skip)]
    pub environment: WalletEnvironment,
}

impl WalletPaymentRequest {
    pub fn new(
        total: Amount,
        currency: &str,
        merchant_name: &str,
        publishable_key: &str,
        environment: WalletEnvironment,
    ) -> Self {
        let card = CardPaymentMethod {
            tokenization_specification: Some(TokenizationSpecification::gateway(publishable_key)),
            ..CardPaymentMethod::default()
        };
        Self {
            api_version: WALLET_API_VERSION,
            api_version_minor: WALLET_API_VERSION_MINOR,
            transaction_info: TransactionInfo {
                total_price: total.to_major_string(),
                total_price_status: "FINAL".to_string(),
                currency_code: currency.to_string(),
            },
            merchant_info: MerchantInfo {
                merchant_name: merchant_name.to_string(),
            },
            allowed_payment_methods: vec![card],
            email_required: false,
            environment,
        }
    }
}

/// The one-shot result the OS delivers once the wallet sheet closes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum WalletActivityResult {
    #[serde(rename_all = "camelCase")]
    Success { payment_data: serde_json::Value },
    Cancelled,
    #[serde(rename_all = "camelCase")]
    Error { status_code: i32 },
}
