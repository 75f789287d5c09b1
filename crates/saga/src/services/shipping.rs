//! Shipping carrier trait, in-memory carrier and quoting with fallback.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId};
use domain::Order;
use serde::{Deserialize, Serialize};

use super::carrier_token::{CarrierSession, LocalTokenIssuer};
use crate::error::SagaError;
use crate::timeout::with_timeout;

/// Identifiers the carrier assigns to a new shipment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedShipment {
    pub carrier_order_id: String,
    pub shipment_id: String,
}

/// A courier assignment with its tracking code (AWB).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingAssignment {
    pub tracking_code: String,
    pub carrier_name: String,
}

/// One scan event reported by the carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingActivity {
    pub status: String,
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Parcel details for a rate quote.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuoteRequest {
    pub destination_postal: String,
    pub weight_kg: f64,
    /// Length, breadth and height in centimetres.
    #[serde(default)]
    pub dimensions_cm: Option<[f64; 3]>,
    #[serde(default)]
    pub cash_on_delivery: bool,
    pub declared_value: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShippingQuote {
    pub charge: Money,
    pub carrier_name: String,
    pub eta_days: Option<u32>,
    /// True when the carrier was unreachable and the flat policy applied.
    pub fallback: bool,
}

/// Trait for shipping carrier aggregator operations.
#[async_trait]
pub trait CarrierClient: Send + Sync {
    async fn create_shipment(&self, order: &Order) -> Result<CreatedShipment, SagaError>;

    /// Assigns a courier. `None` when no courier accepted the shipment yet.
    async fn assign_tracking(
        &self,
        shipment_id: &str,
    ) -> Result<Option<TrackingAssignment>, SagaError>;

    async fn schedule_pickup(&self, shipment_id: &str) -> Result<(), SagaError>;

    async fn cancel_shipment(&self, carrier_order_id: &str) -> Result<(), SagaError>;

    async fn track(&self, tracking_code: &str) -> Result<Vec<TrackingActivity>, SagaError>;

    async fn quote(&self, request: &QuoteRequest) -> Result<ShippingQuote, SagaError>;
}

/// Flat-rate shipping used when no carrier quote is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingPolicy {
    pub flat_charge: Money,
    /// Orders at or above this value ship free.
    pub free_threshold: Money,
}

impl ShippingPolicy {
    pub fn charge_for(&self, order_value: Money) -> Money {
        if order_value >= self.free_threshold {
            Money::zero()
        } else {
            self.flat_charge
        }
    }

    pub fn quote(&self, order_value: Money) -> ShippingQuote {
        ShippingQuote {
            charge: self.charge_for(order_value),
            carrier_name: "Standard".to_string(),
            eta_days: None,
            fallback: true,
        }
    }
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self {
            flat_charge: Money::from_major(50),
            free_threshold: Money::from_major(500),
        }
    }
}

/// Quotes and tracking lookups with a time bound on every carrier call.
#[derive(Debug, Clone)]
pub struct ShippingDesk<C> {
    carrier: C,
    policy: ShippingPolicy,
    timeout: Duration,
}

impl<C: CarrierClient> ShippingDesk<C> {
    pub fn new(carrier: C, policy: ShippingPolicy, timeout: Duration) -> Self {
        Self {
            carrier,
            policy,
            timeout,
        }
    }

    /// Returns the carrier's quote, or the flat policy when the carrier fails.
    #[tracing::instrument(skip(self, request), fields(postal = %request.destination_postal))]
    pub async fn quote(&self, request: &QuoteRequest) -> ShippingQuote {
        match with_timeout("carrier", self.timeout, self.carrier.quote(request)).await {
            Ok(quote) => quote,
            Err(e) => {
                tracing::warn!(error = %e, "carrier quote unavailable, using flat rate");
                self.policy.quote(request.declared_value)
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn track(&self, tracking_code: &str) -> Result<Vec<TrackingActivity>, SagaError> {
        with_timeout("carrier", self.timeout, self.carrier.track(tracking_code)).await
    }
}

#[derive(Debug, Clone)]
struct SimulatedShipment {
    order_id: OrderId,
    carrier_order_id: String,
    tracking_code: Option<String>,
    pickup_scheduled: bool,
    cancelled: bool,
}

#[derive(Debug, Default)]
struct InMemoryCarrierState {
    shipments: HashMap<String, SimulatedShipment>,
    activities: HashMap<String, Vec<TrackingActivity>>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_assign: bool,
    fail_on_cancel: bool,
    fail_on_quote: bool,
    no_courier: bool,
    delay: Option<Duration>,
}

/// In-memory carrier aggregator for testing.
///
/// Every call authenticates through a [`CarrierSession`], as a real client
/// would.
#[derive(Clone)]
pub struct InMemoryCarrier {
    state: Arc<RwLock<InMemoryCarrierState>>,
    issuer: LocalTokenIssuer,
    session: Arc<CarrierSession<LocalTokenIssuer>>,
}

impl InMemoryCarrier {
    pub fn new() -> Self {
        Self::with_token_ttl(chrono::Duration::hours(24))
    }

    pub fn with_token_ttl(ttl: chrono::Duration) -> Self {
        let issuer = LocalTokenIssuer::new(ttl);
        Self {
            state: Arc::default(),
            session: Arc::new(CarrierSession::new(issuer.clone())),
            issuer,
        }
    }

    pub fn set_fail_on_create(&self, fail: bool) {
        self.write().fail_on_create = fail;
    }

    pub fn set_fail_on_assign(&self, fail: bool) {
        self.write().fail_on_assign = fail;
    }

    pub fn set_fail_on_cancel(&self, fail: bool) {
        self.write().fail_on_cancel = fail;
    }

    pub fn set_fail_on_quote(&self, fail: bool) {
        self.write().fail_on_quote = fail;
    }

    /// Makes courier assignment return no courier.
    pub fn set_no_courier(&self, none: bool) {
        self.write().no_courier = none;
    }

    /// Makes every call wait before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    /// Appends a scan event for a tracking code.
    pub fn push_activity(&self, tracking_code: &str, status: &str) {
        self.write()
            .activities
            .entry(tracking_code.to_string())
            .or_default()
            .push(TrackingActivity {
                status: status.to_string(),
                location: None,
                timestamp: Utc::now(),
            });
    }

    pub fn shipment_count(&self) -> usize {
        self.read().shipments.len()
    }

    /// Carrier order ids of cancelled shipments.
    pub fn cancelled(&self) -> Vec<String> {
        self.read()
            .shipments
            .values()
            .filter(|s| s.cancelled)
            .map(|s| s.carrier_order_id.clone())
            .collect()
    }

    /// True if a pickup was scheduled for the order's shipment.
    pub fn pickup_scheduled(&self, order_id: &OrderId) -> bool {
        self.read()
            .shipments
            .values()
            .any(|s| &s.order_id == order_id && s.pickup_scheduled)
    }

    /// Number of auth tokens issued so far.
    pub fn tokens_issued(&self) -> u32 {
        self.issuer.issued()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryCarrierState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryCarrierState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    async fn authorize(&self) -> Result<(), SagaError> {
        let delay = self.read().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.session.token().await.map(|_| ())
    }
}

impl Default for InMemoryCarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCarrier")
            .field("shipments", &self.shipment_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CarrierClient for InMemoryCarrier {
    async fn create_shipment(&self, order: &Order) -> Result<CreatedShipment, SagaError> {
        self.authorize().await?;
        let mut state = self.write();
        if state.fail_on_create {
            return Err(SagaError::external("carrier", "shipment creation rejected"));
        }

        state.next_id += 1;
        let created = CreatedShipment {
            carrier_order_id: format!("CO-{:06}", state.next_id),
            shipment_id: format!("SH-{:06}", state.next_id),
        };
        state.shipments.insert(
            created.shipment_id.clone(),
            SimulatedShipment {
                order_id: order.id.clone(),
                carrier_order_id: created.carrier_order_id.clone(),
                tracking_code: None,
                pickup_scheduled: false,
                cancelled: false,
            },
        );
        Ok(created)
    }

    async fn assign_tracking(
        &self,
        shipment_id: &str,
    ) -> Result<Option<TrackingAssignment>, SagaError> {
        self.authorize().await?;
        let mut state = self.write();
        if state.fail_on_assign {
            return Err(SagaError::external("carrier", "courier assignment failed"));
        }
        if state.no_courier {
            return Ok(None);
        }

        let shipment = state
            .shipments
            .get_mut(shipment_id)
            .ok_or_else(|| {
                SagaError::external("carrier", format!("unknown shipment {shipment_id}"))
            })?;
        let tracking_code = format!("AWB{}", shipment_id.trim_start_matches("SH-"));
        shipment.tracking_code = Some(tracking_code.clone());
        Ok(Some(TrackingAssignment {
            tracking_code,
            carrier_name: "Blue Dart".to_string(),
        }))
    }

    async fn schedule_pickup(&self, shipment_id: &str) -> Result<(), SagaError> {
        self.authorize().await?;
        let mut state = self.write();
        let shipment = state
            .shipments
            .get_mut(shipment_id)
            .ok_or_else(|| {
                SagaError::external("carrier", format!("unknown shipment {shipment_id}"))
            })?;
        shipment.pickup_scheduled = true;
        Ok(())
    }

    async fn cancel_shipment(&self, carrier_order_id: &str) -> Result<(), SagaError> {
        self.authorize().await?;
        let mut state = self.write();
        if state.fail_on_cancel {
            return Err(SagaError::external("carrier", "cancellation rejected"));
        }
        let shipment = state
            .shipments
            .values_mut()
            .find(|s| s.carrier_order_id == carrier_order_id)
            .ok_or_else(|| {
                SagaError::external("carrier", format!("unknown carrier order {carrier_order_id}"))
            })?;
        shipment.cancelled = true;
        Ok(())
    }

    async fn track(&self, tracking_code: &str) -> Result<Vec<TrackingActivity>, SagaError> {
        self.authorize().await?;
        let state = self.read();
        let known = state
            .shipments
            .values()
            .any(|s| s.tracking_code.as_deref() == Some(tracking_code));
        match state.activities.get(tracking_code) {
            Some(activities) => Ok(activities.clone()),
            None if known => Ok(Vec::new()),
            None => Err(SagaError::NotFound(format!(
                "No shipment with tracking code {tracking_code}"
            ))),
        }
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<ShippingQuote, SagaError> {
        self.authorize().await?;
        if self.read().fail_on_quote {
            return Err(SagaError::external("carrier", "serviceability check failed"));
        }

        // 40 base plus 20 per started half kilogram, 30 extra for cash on delivery.
        let half_kilos = (request.weight_kg.max(0.0) * 2.0).ceil() as i64;
        let mut charge = Money::from_major(40 + 20 * half_kilos.max(1));
        if request.cash_on_delivery {
            charge += Money::from_major(30);
        }
        Ok(ShippingQuote {
            charge,
            carrier_name: "Blue Dart".to_string(),
            eta_days: Some(3),
            fallback: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{NewOrder, OrderLine, PaymentMethod, ShippingAddress};

    fn order() -> Order {
        Order::new(
            NewOrder {
                id: OrderId::new("ORD-1"),
                user_id: None,
                items: vec![OrderLine {
                    product_id: "p1".into(),
                    variant_id: None,
                    name: "Mug".into(),
                    quantity: 1,
                    price: Money::from_major(150),
                }],
                payment_method: PaymentMethod::CashOnDelivery,
                payment: None,
                shipping_charge: Money::zero(),
                discount_code: None,
                discount_amount: Money::zero(),
                shipping_address: ShippingAddress::default(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn request(weight_kg: f64) -> QuoteRequest {
        QuoteRequest {
            destination_postal: "560001".into(),
            weight_kg,
            dimensions_cm: None,
            cash_on_delivery: false,
            declared_value: Money::from_major(300),
        }
    }

    #[test]
    fn test_policy_threshold_is_inclusive() {
        let policy = ShippingPolicy::default();
        assert_eq!(policy.charge_for(Money::from_minor(49_999)), Money::from_major(50));
        assert_eq!(policy.charge_for(Money::from_major(500)), Money::zero());
    }

    #[tokio::test]
    async fn test_shipment_lifecycle() {
        let carrier = InMemoryCarrier::new();
        let order = order();

        let created = carrier.create_shipment(&order).await.unwrap();
        let assigned = carrier
            .assign_tracking(&created.shipment_id)
            .await
            .unwrap()
            .unwrap();
        carrier.schedule_pickup(&created.shipment_id).await.unwrap();
        assert!(carrier.pickup_scheduled(&order.id));

        assert!(carrier.track(&assigned.tracking_code).await.unwrap().is_empty());
        carrier.push_activity(&assigned.tracking_code, "In Transit");
        assert_eq!(carrier.track(&assigned.tracking_code).await.unwrap().len(), 1);
        assert!(carrier.track("AWB-nope").await.is_err());

        carrier.cancel_shipment(&created.carrier_order_id).await.unwrap();
        assert_eq!(carrier.cancelled(), vec![created.carrier_order_id]);

        // One token serves every call.
        assert_eq!(carrier.tokens_issued(), 1);
    }

    #[tokio::test]
    async fn test_no_courier_yields_none() {
        let carrier = InMemoryCarrier::new();
        let created = carrier.create_shipment(&order()).await.unwrap();
        carrier.set_no_courier(true);
        let assigned = carrier.assign_tracking(&created.shipment_id).await.unwrap();
        assert!(assigned.is_none());
    }

    #[tokio::test]
    async fn test_desk_falls_back_when_carrier_fails() {
        let carrier = InMemoryCarrier::new();
        let desk = ShippingDesk::new(
            carrier.clone(),
            ShippingPolicy::default(),
            Duration::from_secs(1),
        );

        let live = desk.quote(&request(1.2)).await;
        assert!(!live.fallback);
        assert_eq!(live.charge, Money::from_major(100));

        carrier.set_fail_on_quote(true);
        let fallback = desk.quote(&request(1.2)).await;
        assert!(fallback.fallback);
        assert_eq!(fallback.charge, Money::from_major(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_desk_falls_back_on_timeout() {
        let carrier = InMemoryCarrier::new();
        carrier.set_delay(Some(Duration::from_secs(30)));
        let desk = ShippingDesk::new(
            carrier,
            ShippingPolicy::default(),
            Duration::from_millis(100),
        );

        let mut big = request(2.0);
        big.declared_value = Money::from_major(900);
        let quote = desk.quote(&big).await;
        assert!(quote.fallback);
        assert_eq!(quote.charge, Money::zero());
    }
}
