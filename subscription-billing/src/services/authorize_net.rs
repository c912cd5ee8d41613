//! Authorize.Net payment gateway client.
//!
//! Charges a customer profile stored in the Authorize.Net CIM vault through
//! the JSON `createTransactionRequest` API.

use crate::config::AuthorizeNetConfig;
use crate::error::ChargeError;
use crate::models::ExternalId;
use crate::services::metrics::observe_external_call;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const RESULT_CODE_OK: &str = "Ok";
const RESPONSE_CODE_APPROVED: &str = "1";
const FALLBACK_FAILURE_REASON: &str = "Payment failed";

/// A vaulted customer + payment method pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRef {
    pub customer_profile_id: String,
    pub payment_profile_id: String,
}

impl ProfileRef {
    pub fn new(customer_profile_id: &ExternalId, payment_profile_id: &ExternalId) -> Self {
        Self {
            customer_profile_id: customer_profile_id.to_string(),
            payment_profile_id: payment_profile_id.to_string(),
        }
    }
}

/// Merchant-side reference attached to a charge. `ref_id` doubles as the
/// invoice number and must fit in 20 characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeReference {
    pub ref_id: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeReceipt {
    pub transaction_id: String,
    pub auth_code: Option<String>,
    pub response_code: String,
}

/// Serialisable view of one charge attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ChargeResult {
    pub fn from_outcome(outcome: &Result<ChargeReceipt, ChargeError>) -> Self {
        match outcome {
            Ok(receipt) => Self {
                success: true,
                transaction_id: Some(receipt.transaction_id.clone()),
                auth_code: receipt.auth_code.clone(),
                reason: None,
            },
            Err(e) => Self {
                success: false,
                transaction_id: None,
                auth_code: None,
                reason: Some(e.reason()),
            },
        }
    }
}

/// Charges stored payment profiles.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorize and capture `amount` against `profile` in one step.
    async fn charge(
        &self,
        profile: &ProfileRef,
        amount: Decimal,
        reference: Option<&ChargeReference>,
    ) -> Result<ChargeReceipt, ChargeError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTransactionEnvelope<'a> {
    create_transaction_request: CreateTransactionRequest<'a>,
}

// Field order matters: the gateway validates JSON against its XML schema.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTransactionRequest<'a> {
    merchant_authentication: MerchantAuthentication<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ref_id: Option<&'a str>,
    transaction_request: TransactionRequest<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MerchantAuthentication<'a> {
    name: &'a str,
    transaction_key: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionRequest<'a> {
    transaction_type: &'static str,
    amount: String,
    profile: CustomerProfilePayment<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    order: Option<OrderInfo<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomerProfilePayment<'a> {
    customer_profile_id: &'a str,
    payment_profile: PaymentProfile<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentProfile<'a> {
    payment_profile_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderInfo<'a> {
    invoice_number: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTransactionResponse {
    transaction_response: Option<TransactionResponse>,
    messages: ResponseMessages,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseMessages {
    result_code: String,
    #[serde(default)]
    message: Vec<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionResponse {
    #[serde(default)]
    response_code: String,
    auth_code: Option<String>,
    trans_id: Option<String>,
    #[serde(default)]
    messages: Vec<TransactionMessage>,
    #[serde(default)]
    errors: Vec<TransactionErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct TransactionMessage {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionErrorEntry {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    error_text: String,
}

/// Authorize.Net client. One instance per process, configured explicitly.
#[derive(Clone)]
pub struct AuthorizeNetClient {
    client: Client,
    config: AuthorizeNetConfig,
}

impl AuthorizeNetClient {
    pub fn new(config: AuthorizeNetConfig) -> Result<Self, ChargeError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    /// Check if credentials are set.
    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn build_request<'a>(
        &'a self,
        profile: &'a ProfileRef,
        amount: Decimal,
        reference: Option<&'a ChargeReference>,
    ) -> CreateTransactionEnvelope<'a> {
        CreateTransactionEnvelope {
            create_transaction_request: CreateTransactionRequest {
                merchant_authentication: MerchantAuthentication {
                    name: &self.config.api_login_id,
                    transaction_key: self.config.transaction_key.expose_secret(),
                },
                ref_id: reference.map(|r| r.ref_id.as_str()),
                transaction_request: TransactionRequest {
                    transaction_type: "authCaptureTransaction",
                    amount: format_amount(amount),
                    profile: CustomerProfilePayment {
                        customer_profile_id: &profile.customer_profile_id,
                        payment_profile: PaymentProfile {
                            payment_profile_id: &profile.payment_profile_id,
                        },
                    },
                    order: reference.map(|r| OrderInfo {
                        invoice_number: &r.ref_id,
                        description: r.description.as_deref(),
                    }),
                },
            },
        }
    }
}

#[async_trait]
impl PaymentGateway for AuthorizeNetClient {
    async fn charge(
        &self,
        profile: &ProfileRef,
        amount: Decimal,
        reference: Option<&ChargeReference>,
    ) -> Result<ChargeReceipt, ChargeError> {
        if amount <= Decimal::ZERO {
            return Err(ChargeError::InvalidAmount(amount));
        }
        if !self.is_configured() {
            return Err(ChargeError::NotConfigured);
        }

        let request = self.build_request(profile, amount, reference);
        let start = Instant::now();

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await;
        observe_external_call("authorize_net", "create_transaction", start.elapsed());

        let response = response?;
        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, "Authorize.Net createTransaction response");

        if !status.is_success() {
            return Err(ChargeError::Gateway {
                reason: format!("gateway returned HTTP {}", status.as_u16()),
            });
        }

        let parsed: CreateTransactionResponse =
            serde_json::from_str(strip_bom(&body)).map_err(|e| ChargeError::Gateway {
                reason: format!("unreadable gateway response: {}", e),
            })?;

        let outcome = interpret(parsed);
        match &outcome {
            Ok(receipt) => tracing::info!(
                transaction_id = %receipt.transaction_id,
                customer_profile_id = %profile.customer_profile_id,
                amount = %amount,
                "Authorize.Net charge approved"
            ),
            Err(e) => tracing::warn!(
                customer_profile_id = %profile.customer_profile_id,
                amount = %amount,
                kind = e.kind(),
                reason = %e.reason(),
                "Authorize.Net charge failed"
            ),
        }
        outcome
    }
}

fn interpret(response: CreateTransactionResponse) -> Result<ChargeReceipt, ChargeError> {
    let approved = response.messages.result_code == RESULT_CODE_OK
        && response
            .transaction_response
            .as_ref()
            .is_some_and(|tx| tx.response_code == RESPONSE_CODE_APPROVED);

    if approved {
        if let Some(tx) = response.transaction_response {
            if let Some(transaction_id) = tx.trans_id.filter(|id| !id.is_empty()) {
                return Ok(ChargeReceipt {
                    transaction_id,
                    auth_code: tx.auth_code.filter(|c| !c.is_empty()),
                    response_code: tx.response_code,
                });
            }
        }
        return Err(ChargeError::Gateway {
            reason: "approved response without a transaction id".to_string(),
        });
    }

    let reason = failure_reason(&response);
    match response.transaction_response {
        Some(tx) => Err(ChargeError::Declined {
            reason,
            response_code: tx.response_code,
        }),
        None => Err(ChargeError::Gateway { reason }),
    }
}

/// First available explanation, most specific first.
fn failure_reason(response: &CreateTransactionResponse) -> String {
    let tx = response.transaction_response.as_ref();

    if let Some(e) = tx.and_then(|tx| tx.errors.first()) {
        tracing::debug!(error_code = %e.error_code, "Transaction error");
    }

    tx.and_then(|tx| tx.errors.first())
        .map(|e| e.error_text.clone())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            tx.and_then(|tx| tx.messages.first())
                .map(|m| m.description.clone())
                .filter(|s| !s.is_empty())
        })
        .or_else(|| {
            response
                .messages
                .message
                .first()
                .map(|m| m.text.clone())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| FALLBACK_FAILURE_REASON.to_string())
}

fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

/// The gateway prefixes its JSON with a UTF-8 byte order mark.
fn strip_bom(body: &str) -> &str {
    body.trim_start_matches('\u{feff}')
}
