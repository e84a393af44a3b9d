use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Billing address fields the native payment-method form requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BillingAddressFields {
    None,
    PostalCode,
    Full,
    Name,
}

/// Recognized `requiredBillingAddressFields` values.
///
/// Any value not listed here maps to [`BillingAddressFields::None`].
pub const BILLING_ADDRESS_FIELDS_TABLE: &[(&str, BillingAddressFields)] = &[
    ("none", BillingAddressFields::None),
    ("postalCode", BillingAddressFields::PostalCode),
    ("zip", BillingAddressFields::PostalCode),
    ("full", BillingAddressFields::Full),
    ("name", BillingAddressFields::Name),
];

impl BillingAddressFields {
    pub fn from_config_value(value: &str) -> Self {
        BILLING_ADDRESS_FIELDS_TABLE
            .iter()
            .find(|(name, _)| *name == value)
            .map(|(_, fields)| *fields)
            .unwrap_or_else(|| {
                warn!(value, "unrecognized requiredBillingAddressFields, using none");
                Self::None
            })
    }
}

/// When the wallet availability probe result is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalletProbePolicy {
    /// Probe again after every `clearContext`.
    #[default]
    PerContextReset,
    /// Probe once and keep the answer for the lifetime of the bridge.
    ProcessLifetime,
}

/// Session defaults applied when a payment context is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfig {
    pub wallet_enabled: bool,
    pub alternate_payment_methods_enabled: bool,
    pub required_billing_address_fields: BillingAddressFields,
    /// Merchant display name, also shown by the wallet sheet.
    pub company_name: String,
    pub can_delete_payment_options: bool,
    pub card_scanning_enabled: bool,
    pub currency: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            wallet_enabled: false,
            alternate_payment_methods_enabled: false,
            required_billing_address_fields: BillingAddressFields::Full,
            company_name: String::new(),
            can_delete_payment_options: false,
            card_scanning_enabled: false,
            currency: "USD".to_string(),
        }
    }
}

impl PaymentConfig {
    /// Overwrites every field the update carries and leaves the rest alone.
    pub fn merge(&mut self, update: ConfigUpdate) {
        if let Some(enabled) = update.wallet_enabled {
            self.wallet_enabled = enabled;
        }
        if let Some(enabled) = update.alternate_payment_methods_enabled {
            self.alternate_payment_methods_enabled = enabled;
        }
        if let Some(fields) = update.required_billing_address_fields {
            self.required_billing_address_fields = BillingAddressFields::from_config_value(&fields);
        }
        if let Some(name) = update.company_name {
            self.company_name = name;
        }
        if let Some(enabled) = update.can_delete_payment_options {
            self.can_delete_payment_options = enabled;
        }
        if let Some(enabled) = update.card_scanning_enabled {
            self.card_scanning_enabled = enabled;
        }
        if let Some(currency) = update.currency {
            self.currency = currency;
        }
    }
}

/// A partial configuration object as sent by the host.
///
/// Keys that do not apply to this platform (e.g. `applePayEnabled`) are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    #[serde(alias = "googlePayEnabled")]
    pub wallet_enabled: Option<bool>,
    #[serde(alias = "fpxEnabled")]
    pub alternate_payment_methods_enabled: Option<bool>,
    pub required_billing_address_fields: Option<String>,
    pub company_name: Option<String>,
    pub can_delete_payment_options: Option<bool>,
    pub card_scanning_enabled: Option<bool>,
    pub currency: Option<String>,
}

impl ConfigUpdate {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(BridgeError::InvalidArgument(
                "configuration must be an object".to_string(),
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| BridgeError::InvalidArgument(format!("invalid configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_billing_fields_table() {
        assert_eq!(
            BillingAddressFields::from_config_value("zip"),
            BillingAddressFields::PostalCode
        );
        assert_eq!(
            BillingAddressFields::from_config_value("name"),
            BillingAddressFields::Name
        );
        assert_eq!(
            BillingAddressFields::from_config_value("everything"),
            BillingAddressFields::None
        );
    }

    #[test]
    fn test_merge_keeps_unspecified_fields() {
        let mut config = PaymentConfig::default();
        let update = ConfigUpdate::from_value(json!({
            "companyName": "Acme",
            "googlePayEnabled": true,
            "applePayEnabled": false,
            "appleMerchantIdentifier": "merchant.com.acme",
        }))
        .unwrap();

        config.merge(update);

        assert_eq!(config.company_name, "Acme");
        assert!(config.wallet_enabled);
        assert_eq!(
            config.required_billing_address_fields,
            BillingAddressFields::Full
        );
        assert_eq!(config.currency, "USD");
    }

    #[test]
    fn test_wrongly_typed_known_key_is_rejected() {
        let result = ConfigUpdate::from_value(json!({ "walletEnabled": "yes" }));
        assert!(matches!(result, Err(BridgeError::InvalidArgument(_))));
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(matches!(
            ConfigUpdate::from_value(json!([1, 2])),
            Err(BridgeError::InvalidArgument(_))
        ));
    }
}
