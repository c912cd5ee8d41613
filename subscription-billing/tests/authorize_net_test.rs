//! Authorize.Net client tests against a stubbed gateway.

use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::json;
use std::time::Duration;
use subscription_billing::config::AuthorizeNetConfig;
use subscription_billing::error::ChargeError;
use subscription_billing::services::{
    AuthorizeNetClient, ChargeReference, ChargeResult, PaymentGateway, ProfileRef,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_PATH: &str = "/xml/v1/request.api";

fn client(server: &MockServer) -> AuthorizeNetClient {
    AuthorizeNetClient::new(AuthorizeNetConfig {
        api_login_id: "login-id".to_string(),
        transaction_key: Secret::new("txn-key".to_string()),
        endpoint: format!("{}{}", server.uri(), API_PATH),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn profile() -> ProfileRef {
    ProfileRef {
        customer_profile_id: "500100".to_string(),
        payment_profile_id: "600200".to_string(),
    }
}

/// The live gateway prefixes its JSON with a byte order mark.
fn gateway_body(body: serde_json::Value) -> String {
    format!("\u{feff}{}", body)
}

#[tokio::test]
async fn approved_charge_returns_the_transaction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({
            "createTransactionRequest": {
                "merchantAuthentication": {"name": "login-id", "transactionKey": "txn-key"},
                "refId": "a1b2c3d4e5f6a7b8c9d0",
                "transactionRequest": {
                    "transactionType": "authCaptureTransaction",
                    "amount": "49.99",
                    "profile": {
                        "customerProfileId": "500100",
                        "paymentProfile": {"paymentProfileId": "600200"}
                    },
                    "order": {"invoiceNumber": "a1b2c3d4e5f6a7b8c9d0"}
                }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(gateway_body(json!({
            "transactionResponse": {
                "responseCode": "1",
                "authCode": "QWE123",
                "transId": "60123456789",
                "messages": [{"code": "1", "description": "This transaction has been approved."}]
            },
            "refId": "a1b2c3d4e5f6a7b8c9d0",
            "messages": {"resultCode": "Ok", "message": [{"code": "I00001", "text": "Successful."}]}
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let reference = ChargeReference {
        ref_id: "a1b2c3d4e5f6a7b8c9d0".to_string(),
        description: None,
    };
    let receipt = client(&server)
        .charge(&profile(), Decimal::new(4999, 2), Some(&reference))
        .await
        .unwrap();

    assert_eq!(receipt.transaction_id, "60123456789");
    assert_eq!(receipt.auth_code.as_deref(), Some("QWE123"));
    assert_eq!(receipt.response_code, "1");
}

#[tokio::test]
async fn declined_charge_reports_the_transaction_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(gateway_body(json!({
            "transactionResponse": {
                "responseCode": "2",
                "transId": "0",
                "errors": [{"errorCode": "2", "errorText": "This transaction has been declined."}]
            },
            "messages": {
                "resultCode": "Error",
                "message": [{"code": "E00027", "text": "The transaction was unsuccessful."}]
            }
        }))))
        .mount(&server)
        .await;

    let outcome = client(&server)
        .charge(&profile(), Decimal::new(50, 0), None)
        .await;

    let result = ChargeResult::from_outcome(&outcome);
    assert!(!result.success);
    assert_eq!(
        result.reason.as_deref(),
        Some("This transaction has been declined.")
    );
    assert!(matches!(outcome, Err(ChargeError::Declined { .. })));
}

#[tokio::test]
async fn rejected_credentials_are_a_gateway_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(gateway_body(json!({
            "messages": {
                "resultCode": "Error",
                "message": [{
                    "code": "E00007",
                    "text": "User authentication failed due to invalid authentication values."
                }]
            }
        }))))
        .mount(&server)
        .await;

    let err = client(&server)
        .charge(&profile(), Decimal::new(50, 0), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ChargeError::Gateway { .. }));
    assert_eq!(
        err.reason(),
        "User authentication failed due to invalid authentication values."
    );
}

#[tokio::test]
async fn server_error_is_a_gateway_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server)
        .charge(&profile(), Decimal::new(50, 0), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ChargeError::Gateway { .. }));
}

#[tokio::test]
async fn non_positive_amount_never_reaches_the_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server);
    for amount in [Decimal::ZERO, Decimal::new(-500, 2)] {
        let err = client.charge(&profile(), amount, None).await.unwrap_err();
        assert!(matches!(err, ChargeError::InvalidAmount(_)));
    }
}

#[tokio::test]
async fn missing_credentials_are_not_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = AuthorizeNetClient::new(AuthorizeNetConfig {
        api_login_id: String::new(),
        transaction_key: Secret::new(String::new()),
        endpoint: format!("{}{}", server.uri(), API_PATH),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap();

    let err = client
        .charge(&profile(), Decimal::new(50, 0), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ChargeError::NotConfigured));
}

#[tokio::test]
async fn unreachable_gateway_is_a_transport_error() {
    let client = AuthorizeNetClient::new(AuthorizeNetConfig {
        api_login_id: "login-id".to_string(),
        transaction_key: Secret::new("txn-key".to_string()),
        endpoint: "http://127.0.0.1:1/xml/v1/request.api".to_string(),
        request_timeout: Duration::from_secs(2),
    })
    .unwrap();

    let err = client
        .charge(&profile(), Decimal::new(50, 0), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ChargeError::Transport(_)));
}
