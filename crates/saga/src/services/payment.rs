//! Payment gateway trait, signature verification and in-memory gateway.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::Money;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::SagaError;

type HmacSha256 = Hmac<Sha256>;

/// An order registered with the payment gateway before the customer pays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: Money,
    pub currency: String,
    pub receipt: String,
}

/// How quickly the gateway should settle a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundSpeed {
    #[default]
    Normal,
    Optimum,
}

/// Trait for payment gateway operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Registers an order the customer will pay against.
    async fn create_order(
        &self,
        amount: Money,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, SagaError>;

    /// Refunds a captured payment. Returns the gateway's refund id.
    async fn refund(
        &self,
        payment_id: &str,
        amount: Money,
        speed: RefundSpeed,
        notes: &str,
    ) -> Result<String, SagaError>;
}

/// Checks payment confirmations signed by the gateway.
///
/// The signature is the hex HMAC-SHA256 of `gateway_order_id|payment_id`
/// keyed with the merchant secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl SignatureVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Computes the signature the gateway sends for a payment.
    pub fn sign(&self, gateway_order_id: &str, payment_id: &str) -> Result<String, SagaError> {
        let mac = self.mac(gateway_order_id, payment_id)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Returns true if `signature` matches. Comparison is constant time.
    pub fn verify(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        self.mac(gateway_order_id, payment_id)
            .is_ok_and(|mac| mac.verify_slice(&expected).is_ok())
    }

    fn mac(&self, gateway_order_id: &str, payment_id: &str) -> Result<HmacSha256, SagaError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| SagaError::Validation(format!("invalid payment secret: {e}")))?;
        mac.update(gateway_order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        Ok(mac)
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

/// A refund accepted by the in-memory gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRefund {
    pub refund_id: String,
    pub payment_id: String,
    pub amount: Money,
    pub speed: RefundSpeed,
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    orders: HashMap<String, GatewayOrder>,
    refunds: Vec<RecordedRefund>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_refund: bool,
    delay: Option<Duration>,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to reject order creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.write().fail_on_create = fail;
    }

    /// Configures the gateway to reject refunds.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.write().fail_on_refund = fail;
    }

    /// Makes every call wait before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    /// Returns the refunds accepted so far.
    pub fn refunds(&self) -> Vec<RecordedRefund> {
        self.read().refunds.clone()
    }

    /// Returns the number of registered orders.
    pub fn order_count(&self) -> usize {
        self.read().orders.len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryPaymentState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryPaymentState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        let delay = self.read().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_order(
        &self,
        amount: Money,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, SagaError> {
        self.simulate_latency().await;
        let mut state = self.write();

        if state.fail_on_create {
            return Err(SagaError::external("payment", "order creation declined"));
        }
        if !amount.is_positive() {
            return Err(SagaError::Validation(
                "Payment amount must be positive".to_string(),
            ));
        }

        state.next_id += 1;
        let order = GatewayOrder {
            id: format!("order_{:06}", state.next_id),
            amount,
            currency: currency.to_string(),
            receipt: receipt.to_string(),
        };
        state.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn refund(
        &self,
        payment_id: &str,
        amount: Money,
        speed: RefundSpeed,
        _notes: &str,
    ) -> Result<String, SagaError> {
        self.simulate_latency().await;
        let mut state = self.write();

        if state.fail_on_refund {
            return Err(SagaError::external("payment", "refund declined"));
        }

        state.next_id += 1;
        let refund_id = format!("rfnd_{:06}", state.next_id);
        state.refunds.push(RecordedRefund {
            refund_id: refund_id.clone(),
            payment_id: payment_id.to_string(),
            amount,
            speed,
        });
        Ok(refund_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip_and_tamper() {
        let verifier = SignatureVerifier::new("secret");
        let signature = verifier.sign("order_1", "pay_1").unwrap();

        assert_eq!(signature.len(), 64);
        assert!(verifier.verify("order_1", "pay_1", &signature));
        assert!(verifier.verify("order_1", "pay_1", &signature.to_uppercase()));
        assert!(!verifier.verify("order_1", "pay_2", &signature));
        assert!(!verifier.verify("order_1", "pay_1", "not-hex"));
        assert!(!SignatureVerifier::new("other").verify("order_1", "pay_1", &signature));
    }

    #[test]
    fn test_signature_matches_known_vector() {
        let verifier = SignatureVerifier::new("secret");
        assert_eq!(
            verifier.sign("order_1", "pay_1").unwrap(),
            "52115a0d3400de9e86aade1f1b6eba9e8974604f4e267a9e9a16633a4c8dd2cb"
        );
    }

    #[tokio::test]
    async fn test_create_order_and_refund() {
        let gateway = InMemoryPaymentGateway::new();

        let order = gateway
            .create_order(Money::from_major(500), "INR", "rcpt-1")
            .await
            .unwrap();
        assert!(order.id.starts_with("order_"));
        assert_eq!(gateway.order_count(), 1);

        let refund_id = gateway
            .refund("pay_1", Money::from_major(500), RefundSpeed::Normal, "cancelled")
            .await
            .unwrap();
        assert!(refund_id.starts_with("rfnd_"));
        assert_eq!(gateway.refunds()[0].payment_id, "pay_1");
    }

    #[tokio::test]
    async fn test_fail_toggles() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_fail_on_create(true);
        gateway.set_fail_on_refund(true);

        assert!(
            gateway
                .create_order(Money::from_major(1), "INR", "r")
                .await
                .is_err()
        );
        assert!(
            gateway
                .refund("pay_1", Money::from_major(1), RefundSpeed::Optimum, "")
                .await
                .is_err()
        );
        assert!(gateway.refunds().is_empty());
    }
}
