//! Validity, eligibility and applicability checks plus discount arithmetic.

use chrono::{DateTime, Utc};
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use super::DiscountError;
use super::codes::{
    Applicability, PromoKind, PromotionalCode, ReferralCode, ReferralKind, UserEligibility,
};

/// A cart line as the discount rules see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub product_id: ProductId,
    pub category: String,
    pub subcategory: Option<String>,
    pub line_total: Money,
}

/// What is known about the customer redeeming a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerHistory {
    /// Unauthenticated checkout.
    Guest,
    Known {
        /// Prior orders that were not cancelled.
        prior_orders: u64,
        /// Prior non-cancelled orders that used this code.
        code_redemptions: u64,
    },
}

/// Product-level choices about eligibility that the rules leave open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EligibilityPolicy {
    /// Reject `newOnly` codes for guest checkouts.
    pub new_only_blocks_guests: bool,
}

/// Inputs to a discount evaluation.
#[derive(Debug, Clone)]
pub struct DiscountContext<'a> {
    pub subtotal: Money,
    pub items: &'a [CartItem],
    pub customer: CustomerHistory,
    pub now: DateTime<Utc>,
    pub policy: EligibilityPolicy,
}

/// Which registry a code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CodeSource {
    Promotional,
    Referral,
}

/// Result of a successful evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountOutcome {
    /// Code as stored in the registry.
    pub code: String,
    pub source: CodeSource,
    pub amount: Money,
    /// True when the code waives shipping.
    pub free_shipping: bool,
    /// Subtotal of the items the code applies to.
    pub eligible_subtotal: Money,
}

/// A code found in either registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscountCode {
    Promotional(PromotionalCode),
    Referral(ReferralCode),
}

impl DiscountCode {
    pub fn code(&self) -> &str {
        match self {
            DiscountCode::Promotional(p) => &p.code,
            DiscountCode::Referral(r) => &r.code,
        }
    }

    pub fn source(&self) -> CodeSource {
        match self {
            DiscountCode::Promotional(_) => CodeSource::Promotional,
            DiscountCode::Referral(_) => CodeSource::Referral,
        }
    }

    /// Runs every check in order and computes the discount.
    pub fn evaluate(&self, ctx: &DiscountContext<'_>) -> Result<DiscountOutcome, DiscountError> {
        match self {
            DiscountCode::Promotional(promo) => evaluate_promotional(promo, ctx),
            DiscountCode::Referral(referral) => evaluate_referral(referral, ctx),
        }
    }
}

fn evaluate_promotional(
    promo: &PromotionalCode,
    ctx: &DiscountContext<'_>,
) -> Result<DiscountOutcome, DiscountError> {
    let code = || promo.code.clone();

    if !promo.active {
        return Err(DiscountError::Inactive { code: code() });
    }
    if promo.valid_until.is_some_and(|until| until <= ctx.now) {
        return Err(DiscountError::Expired { code: code() });
    }
    if promo
        .usage_limit
        .is_some_and(|limit| promo.usage_count >= limit)
    {
        return Err(DiscountError::UsageLimitReached { code: code() });
    }
    if let Some(minimum) = promo.min_order_value
        && ctx.subtotal < minimum
    {
        return Err(DiscountError::BelowMinimum {
            code: code(),
            minimum,
        });
    }

    match ctx.customer {
        CustomerHistory::Known {
            prior_orders,
            code_redemptions,
        } => {
            if promo
                .per_user_limit
                .is_some_and(|limit| code_redemptions >= u64::from(limit))
            {
                return Err(DiscountError::PerUserLimitReached { code: code() });
            }
            if promo.user_eligibility == UserEligibility::NewOnly && prior_orders > 0 {
                return Err(DiscountError::NewCustomersOnly { code: code() });
            }
        }
        CustomerHistory::Guest => {
            if promo.user_eligibility == UserEligibility::NewOnly
                && ctx.policy.new_only_blocks_guests
            {
                return Err(DiscountError::NewCustomersOnly { code: code() });
            }
        }
    }

    let eligible_subtotal = eligible_subtotal(promo.applicability, &promo.target_items, ctx)
        .ok_or_else(|| DiscountError::NotApplicable { code: code() })?;

    let (amount, free_shipping) = match promo.discount {
        // Scope gates acceptance; the percentage applies to the whole subtotal.
        PromoKind::Percent(percent) => {
            let raw = ctx.subtotal.percent(percent);
            let capped = promo.max_discount.map_or(raw, |cap| raw.min(cap));
            (capped, false)
        }
        PromoKind::Flat(value) => (value, false),
        PromoKind::FreeShipping => (Money::zero(), true),
    };

    Ok(DiscountOutcome {
        code: promo.code.clone(),
        source: CodeSource::Promotional,
        amount,
        free_shipping,
        eligible_subtotal,
    })
}

fn evaluate_referral(
    referral: &ReferralCode,
    ctx: &DiscountContext<'_>,
) -> Result<DiscountOutcome, DiscountError> {
    let code = || referral.code.clone();

    if !referral.active {
        return Err(DiscountError::Inactive { code: code() });
    }
    if referral.valid_to.is_some_and(|to| to <= ctx.now) {
        return Err(DiscountError::Expired { code: code() });
    }
    if referral.valid_from.is_some_and(|from| from > ctx.now) {
        return Err(DiscountError::NotYetValid { code: code() });
    }

    let amount = match referral.discount {
        ReferralKind::Percentage(percent) => ctx.subtotal.percent(percent),
        ReferralKind::Fixed(value) => value,
    };

    Ok(DiscountOutcome {
        code: referral.code.clone(),
        source: CodeSource::Referral,
        amount,
        free_shipping: false,
        eligible_subtotal: ctx.subtotal,
    })
}

/// Subtotal of the items within scope, or `None` if no item is.
fn eligible_subtotal(
    applicability: Applicability,
    targets: &[String],
    ctx: &DiscountContext<'_>,
) -> Option<Money> {
    let in_scope = |item: &CartItem| -> bool {
        let targeted = |value: &str| targets.iter().any(|t| t.eq_ignore_ascii_case(value));
        match applicability {
            Applicability::All => true,
            Applicability::Product => targeted(item.product_id.as_str()),
            Applicability::Category => targeted(&item.category),
            Applicability::Subcategory => item.subcategory.as_deref().is_some_and(targeted),
        }
    };

    if applicability == Applicability::All {
        return Some(ctx.subtotal);
    }

    let eligible: Vec<&CartItem> = ctx.items.iter().filter(|&i| in_scope(i)).collect();
    if eligible.is_empty() {
        return None;
    }
    Some(eligible.iter().map(|i| i.line_total).sum())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn items() -> Vec<CartItem> {
        vec![
            CartItem {
                product_id: ProductId::new("p1"),
                category: "apparel".into(),
                subcategory: Some("tees".into()),
                line_total: Money::from_major(600),
            },
            CartItem {
                product_id: ProductId::new("p2"),
                category: "home".into(),
                subcategory: None,
                line_total: Money::from_major(400),
            },
        ]
    }

    fn ctx<'a>(
        subtotal: Money,
        items: &'a [CartItem],
        customer: CustomerHistory,
    ) -> DiscountContext<'a> {
        DiscountContext {
            subtotal,
            items,
            customer,
            now: Utc::now(),
            policy: EligibilityPolicy::default(),
        }
    }

    fn known(prior_orders: u64, code_redemptions: u64) -> CustomerHistory {
        CustomerHistory::Known {
            prior_orders,
            code_redemptions,
        }
    }

    #[test]
    fn test_min_order_value_boundary() {
        let items = items();
        let mut promo = PromotionalCode::new("MIN500", PromoKind::Flat(Money::from_major(50)));
        promo.min_order_value = Some(Money::from_major(500));
        let code = DiscountCode::Promotional(promo);

        let err = code
            .evaluate(&ctx(Money::from_major(499), &items, CustomerHistory::Guest))
            .unwrap_err();
        assert!(matches!(err, DiscountError::BelowMinimum { .. }));

        let ok = code
            .evaluate(&ctx(Money::from_major(500), &items, CustomerHistory::Guest))
            .unwrap();
        assert_eq!(ok.amount, Money::from_major(50));
    }

    #[test]
    fn test_percent_is_clamped_to_max_discount() {
        let items = items();
        let mut promo = PromotionalCode::new("HALF", PromoKind::Percent(50));
        promo.max_discount = Some(Money::from_major(100));
        let outcome = DiscountCode::Promotional(promo)
            .evaluate(&ctx(Money::from_major(1000), &items, CustomerHistory::Guest))
            .unwrap();
        assert_eq!(outcome.amount, Money::from_major(100));
    }

    #[test]
    fn test_percent_without_cap() {
        let items = items();
        let promo = PromotionalCode::new("TEN", PromoKind::Percent(10));
        let outcome = DiscountCode::Promotional(promo)
            .evaluate(&ctx(Money::from_major(1000), &items, CustomerHistory::Guest))
            .unwrap();
        assert_eq!(outcome.amount, Money::from_major(100));
        assert!(!outcome.free_shipping);
    }

    #[test]
    fn test_free_shipping_has_no_monetary_discount() {
        let items = items();
        let promo = PromotionalCode::new("SHIPFREE", PromoKind::FreeShipping);
        let outcome = DiscountCode::Promotional(promo)
            .evaluate(&ctx(Money::from_major(1000), &items, CustomerHistory::Guest))
            .unwrap();
        assert_eq!(outcome.amount, Money::zero());
        assert!(outcome.free_shipping);
    }

    #[test]
    fn test_inactive_and_expired_codes_are_rejected() {
        let items = items();
        let mut promo = PromotionalCode::new("OLD", PromoKind::Percent(10));
        promo.active = false;
        let err = DiscountCode::Promotional(promo.clone())
            .evaluate(&ctx(Money::from_major(1000), &items, CustomerHistory::Guest))
            .unwrap_err();
        assert!(matches!(err, DiscountError::Inactive { .. }));

        promo.active = true;
        promo.valid_until = Some(Utc::now() - Duration::days(1));
        let err = DiscountCode::Promotional(promo)
            .evaluate(&ctx(Money::from_major(1000), &items, CustomerHistory::Guest))
            .unwrap_err();
        assert!(matches!(err, DiscountError::Expired { .. }));
    }

    #[test]
    fn test_usage_limit_reached() {
        let items = items();
        let mut promo = PromotionalCode::new("LIMITED", PromoKind::Percent(10));
        promo.usage_limit = Some(3);
        promo.usage_count = 3;
        let err = DiscountCode::Promotional(promo)
            .evaluate(&ctx(Money::from_major(1000), &items, CustomerHistory::Guest))
            .unwrap_err();
        assert!(matches!(err, DiscountError::UsageLimitReached { .. }));
    }

    #[test]
    fn test_per_user_limit_applies_to_known_users_only() {
        let items = items();
        let mut promo = PromotionalCode::new("ONCE", PromoKind::Percent(10));
        promo.per_user_limit = Some(1);
        let code = DiscountCode::Promotional(promo);

        let err = code
            .evaluate(&ctx(Money::from_major(1000), &items, known(4, 1)))
            .unwrap_err();
        assert!(matches!(err, DiscountError::PerUserLimitReached { .. }));

        assert!(
            code.evaluate(&ctx(Money::from_major(1000), &items, known(4, 0)))
                .is_ok()
        );
    }

    #[test]
    fn test_new_only_rejects_returning_customers() {
        let items = items();
        let mut promo = PromotionalCode::new("WELCOME", PromoKind::Percent(10));
        promo.user_eligibility = UserEligibility::NewOnly;
        let code = DiscountCode::Promotional(promo);

        let err = code
            .evaluate(&ctx(Money::from_major(1000), &items, known(1, 0)))
            .unwrap_err();
        assert!(matches!(err, DiscountError::NewCustomersOnly { .. }));
        assert!(
            code.evaluate(&ctx(Money::from_major(1000), &items, known(0, 0)))
                .is_ok()
        );
    }

    #[test]
    fn test_new_only_guest_handling_follows_policy() {
        let items = items();
        let mut promo = PromotionalCode::new("WELCOME", PromoKind::Percent(10));
        promo.user_eligibility = UserEligibility::NewOnly;
        let code = DiscountCode::Promotional(promo);

        let mut context = ctx(Money::from_major(1000), &items, CustomerHistory::Guest);
        assert!(code.evaluate(&context).is_ok());

        context.policy.new_only_blocks_guests = true;
        assert!(matches!(
            code.evaluate(&context).unwrap_err(),
            DiscountError::NewCustomersOnly { .. }
        ));
    }

    #[test]
    fn test_scoped_percent_code_applies_to_whole_subtotal() {
        let items = items();
        let mut promo = PromotionalCode::new("TEES", PromoKind::Percent(10));
        promo.applicability = Applicability::Subcategory;
        promo.target_items = vec!["Tees".into()];
        let outcome = DiscountCode::Promotional(promo)
            .evaluate(&ctx(Money::from_major(1000), &items, CustomerHistory::Guest))
            .unwrap();
        assert_eq!(outcome.eligible_subtotal, Money::from_major(600));
        assert_eq!(outcome.amount, Money::from_major(100));
    }

    #[test]
    fn test_scoped_code_without_matching_items_is_rejected() {
        let items = items();
        let mut promo = PromotionalCode::new("TOYS", PromoKind::Percent(10));
        promo.applicability = Applicability::Category;
        promo.target_items = vec!["toys".into()];
        let err = DiscountCode::Promotional(promo)
            .evaluate(&ctx(Money::from_major(1000), &items, CustomerHistory::Guest))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Discount code 'TOYS' is not applicable to items in your cart"
        );
    }

    #[test]
    fn test_product_scope_matches_product_ids() {
        let items = items();
        let mut promo = PromotionalCode::new("MUG", PromoKind::Flat(Money::from_major(20)));
        promo.applicability = Applicability::Product;
        promo.target_items = vec!["p2".into()];
        let outcome = DiscountCode::Promotional(promo)
            .evaluate(&ctx(Money::from_major(1000), &items, CustomerHistory::Guest))
            .unwrap();
        assert_eq!(outcome.amount, Money::from_major(20));
        assert_eq!(outcome.eligible_subtotal, Money::from_major(400));
    }

    #[test]
    fn test_expired_referral_is_rejected_with_expiry_error() {
        let items = items();
        let mut referral = ReferralCode::new("FRIEND", ReferralKind::Percentage(5));
        referral.valid_to = Some(Utc::now() - Duration::hours(1));
        let err = DiscountCode::Referral(referral)
            .evaluate(&ctx(Money::from_major(1000), &items, known(0, 0)))
            .unwrap_err();
        assert_eq!(
            err,
            DiscountError::Expired {
                code: "FRIEND".into()
            }
        );
    }

    #[test]
    fn test_referral_not_yet_valid() {
        let items = items();
        let mut referral = ReferralCode::new("SOON", ReferralKind::Fixed(Money::from_major(10)));
        referral.valid_from = Some(Utc::now() + Duration::days(2));
        let err = DiscountCode::Referral(referral)
            .evaluate(&ctx(Money::from_major(1000), &items, CustomerHistory::Guest))
            .unwrap_err();
        assert!(matches!(err, DiscountError::NotYetValid { .. }));
    }

    #[test]
    fn test_referral_arithmetic() {
        let items = items();
        let pct = DiscountCode::Referral(ReferralCode::new("R5", ReferralKind::Percentage(5)));
        let outcome = pct
            .evaluate(&ctx(Money::from_major(1000), &items, CustomerHistory::Guest))
            .unwrap();
        assert_eq!(outcome.amount, Money::from_major(50));
        assert_eq!(outcome.source, CodeSource::Referral);

        let fixed = DiscountCode::Referral(ReferralCode::new(
            "R75",
            ReferralKind::Fixed(Money::from_major(75)),
        ));
        let outcome = fixed
            .evaluate(&ctx(Money::from_major(1000), &items, CustomerHistory::Guest))
            .unwrap();
        assert_eq!(outcome.amount, Money::from_major(75));
    }
}
