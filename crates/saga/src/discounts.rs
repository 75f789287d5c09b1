//! Discount code lookup, evaluation against customer history, and usage
//! accounting.

use chrono::Utc;
use common::{Money, UserId};
use domain::{
    CartItem, CodeSource, CustomerHistory, DiscountCode, DiscountContext, DiscountError,
    DiscountOutcome, EligibilityPolicy,
};
use store::{CodeRegistry, OrderRepository};

use crate::error::SagaError;

/// Resolves codes from both registries and keeps their usage counters.
#[derive(Debug, Clone)]
pub struct DiscountEngine<S> {
    store: S,
    policy: EligibilityPolicy,
}

impl<S> DiscountEngine<S>
where
    S: CodeRegistry + OrderRepository,
{
    pub fn new(store: S, policy: EligibilityPolicy) -> Self {
        Self { store, policy }
    }

    /// Finds a code, promotional first, then referral. Case-insensitive.
    pub async fn lookup(&self, code: &str) -> Result<Option<DiscountCode>, SagaError> {
        if let Some(promo) = self.store.find_promotional_code(code).await? {
            return Ok(Some(DiscountCode::Promotional(promo)));
        }
        Ok(self
            .store
            .find_referral_code(code)
            .await?
            .map(DiscountCode::Referral))
    }

    /// Checks a code against the cart and the customer and computes the
    /// discount.
    #[tracing::instrument(skip(self, items), fields(code = %code, subtotal = %subtotal))]
    pub async fn evaluate(
        &self,
        code: &str,
        subtotal: Money,
        items: &[CartItem],
        user_id: Option<&UserId>,
    ) -> Result<DiscountOutcome, SagaError> {
        let found = self
            .lookup(code)
            .await?
            .ok_or_else(|| DiscountError::NotFound {
                code: code.trim().to_string(),
            })?;

        let customer = match user_id {
            None => CustomerHistory::Guest,
            Some(user_id) => CustomerHistory::Known {
                prior_orders: self.store.count_active_orders(user_id).await?,
                code_redemptions: self
                    .store
                    .count_code_redemptions(user_id, found.code())
                    .await?,
            },
        };

        let ctx = DiscountContext {
            subtotal,
            items,
            customer,
            now: Utc::now(),
            policy: self.policy,
        };
        let outcome = found.evaluate(&ctx)?;
        tracing::debug!(
            amount = %outcome.amount,
            free_shipping = outcome.free_shipping,
            "discount accepted"
        );
        Ok(outcome)
    }

    /// Counts one redemption. Referral codes also accumulate `sale`.
    pub async fn record_usage(
        &self,
        outcome: &DiscountOutcome,
        sale: Money,
    ) -> Result<(), SagaError> {
        let counted = match outcome.source {
            CodeSource::Promotional => {
                self.store
                    .try_increment_promotional_usage(&outcome.code)
                    .await?
            }
            CodeSource::Referral => {
                self.store
                    .record_referral_sale(&outcome.code, sale)
                    .await?
            }
        };
        if !counted {
            // The limit was reached by a concurrent checkout after evaluation.
            return Err(SagaError::Conflict(format!(
                "Usage of discount code '{}' could not be recorded",
                outcome.code
            )));
        }
        Ok(())
    }

    /// Reverses one redemption of `code`, including its attributed `sale`.
    pub async fn reverse_usage(&self, code: &str, sale: Money) -> Result<(), SagaError> {
        match self.lookup(code).await? {
            Some(DiscountCode::Promotional(promo)) => {
                self.store.decrement_promotional_usage(&promo.code).await?;
            }
            Some(DiscountCode::Referral(referral)) => {
                self.store
                    .reverse_referral_sale(&referral.code, sale)
                    .await?;
            }
            None => {
                tracing::warn!(code, "code no longer exists, usage not reversed");
            }
        }
        Ok(())
    }
}
