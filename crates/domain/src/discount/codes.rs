//! Promotional and referral code records.

use chrono::{DateTime, Utc};
use common::Money;
use serde::{Deserialize, Serialize};

/// How a promotional code discounts an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum PromoKind {
    /// Percentage of the eligible subtotal.
    Percent(u32),
    /// Fixed amount off.
    Flat(Money),
    /// No monetary discount; shipping is waived.
    FreeShipping,
}

/// Which customers may redeem a promotional code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserEligibility {
    #[default]
    All,
    /// Only customers with no prior non-cancelled orders.
    NewOnly,
}

/// Which cart items a code applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Applicability {
    #[default]
    All,
    Product,
    Category,
    Subcategory,
}

/// A promotional (coupon) code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionalCode {
    pub code: String,
    pub discount: PromoKind,
    #[serde(default)]
    pub min_order_value: Option<Money>,
    #[serde(default)]
    pub max_discount: Option<Money>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default)]
    pub per_user_limit: Option<u32>,
    #[serde(default)]
    pub user_eligibility: UserEligibility,
    #[serde(default)]
    pub applicability: Applicability,
    /// Product ids, categories or subcategories, depending on `applicability`.
    #[serde(default)]
    pub target_items: Vec<String>,
    pub active: bool,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl PromotionalCode {
    /// Creates an active, unlimited code applying to every item.
    pub fn new(code: impl Into<String>, discount: PromoKind) -> Self {
        Self {
            code: code.into(),
            discount,
            min_order_value: None,
            max_discount: None,
            usage_limit: None,
            usage_count: 0,
            per_user_limit: None,
            user_eligibility: UserEligibility::All,
            applicability: Applicability::All,
            target_items: Vec::new(),
            active: true,
            valid_until: None,
        }
    }
}

/// How a referral code discounts an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ReferralKind {
    Percentage(u32),
    Fixed(Money),
}

/// A referral code owned by an affiliate.
///
/// Referral codes always apply to the whole cart, have no per-user limit,
/// and accumulate the gross sales they bring in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralCode {
    pub code: String,
    pub discount: ReferralKind,
    /// Affiliate commission, in percent of attributed sales.
    #[serde(default)]
    pub commission_rate: u32,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default)]
    pub total_sales: Money,
    pub active: bool,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
}

impl ReferralCode {
    /// Creates an active referral code with no validity window.
    pub fn new(code: impl Into<String>, discount: ReferralKind) -> Self {
        Self {
            code: code.into(),
            discount,
            commission_rate: 0,
            usage_count: 0,
            total_sales: Money::zero(),
            active: true,
            valid_from: None,
            valid_to: None,
        }
    }

    /// Commission owed on the attributed sales so far.
    pub fn commission_due(&self) -> Money {
        self.total_sales.percent(self.commission_rate)
    }
}
