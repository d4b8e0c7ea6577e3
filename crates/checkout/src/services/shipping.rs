use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use common::{Address, Currency, Money};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuote {
    pub carrier: String,
    pub service: String,
    pub cost: Money,
    pub currency: Currency,
    pub estimated_days: u32,
}

/// Quotes shipping for a package.
#[async_trait]
pub trait ShippingQuoter: Send + Sync {
    /// Returns the available quotes, preferred first.
    async fn get_quote(
        &self,
        from: Option<&Address>,
        to: &Address,
        weight_grams: u32,
    ) -> Result<Vec<ShippingQuote>, ServiceError>;
}

const BASE_COST_CENTS: i64 = 500;

/// (carrier, service, cents per 100 g, estimated days)
const RATE_TABLE: [(&str, &str, i64, u32); 5] = [
    ("USPS", "Priority Mail", 15, 3),
    ("USPS", "First Class", 10, 5),
    ("FedEx", "Ground", 18, 4),
    ("FedEx", "2-Day", 35, 2),
    ("UPS", "Ground", 17, 4),
];

#[derive(Debug, Default)]
struct StubShippingState {
    fail: bool,
    return_empty: bool,
    calls: usize,
}

/// Quoter backed by a fixed carrier rate table: 5.00 plus a per-gram rate.
#[derive(Debug, Clone, Default)]
pub struct StubShippingQuoter {
    state: Arc<RwLock<StubShippingState>>,
}

impl StubShippingQuoter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.write().fail = fail;
    }

    /// Makes the quoter answer with no quotes at all.
    pub fn set_return_empty(&self, empty: bool) {
        self.write().return_empty = empty;
    }

    pub fn calls(&self) -> usize {
        self.read().calls
    }

    /// Cost of the first quote the table produces for `weight_grams`.
    pub fn preferred_cost(weight_grams: u32) -> Money {
        let (_, _, rate, _) = RATE_TABLE[0];
        cost_for(weight_grams, rate)
    }

    fn read(&self) -> RwLockReadGuard<'_, StubShippingState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StubShippingState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn cost_for(weight_grams: u32, cents_per_100g: i64) -> Money {
    Money::from_cents(BASE_COST_CENTS + i64::from(weight_grams) * cents_per_100g / 100)
}

#[async_trait]
impl ShippingQuoter for StubShippingQuoter {
    async fn get_quote(
        &self,
        _from: Option<&Address>,
        _to: &Address,
        weight_grams: u32,
    ) -> Result<Vec<ShippingQuote>, ServiceError> {
        let (fail, return_empty) = {
            let mut state = self.write();
            state.calls += 1;
            (state.fail, state.return_empty)
        };
        if fail {
            return Err(ServiceError::new("shipping", "simulated outage"));
        }
        if weight_grams == 0 {
            return Err(ServiceError::new("shipping", "package weight must be positive"));
        }
        if return_empty {
            return Ok(Vec::new());
        }

        Ok(RATE_TABLE
            .iter()
            .map(|&(carrier, service, rate, days)| ShippingQuote {
                carrier: carrier.to_string(),
                service: service.to_string(),
                cost: cost_for(weight_grams, rate),
                currency: Currency::usd(),
                estimated_days: days,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination() -> Address {
        Address::new("1 Main St", "Springfield", "IL", "62701", "US")
    }

    #[tokio::test]
    async fn test_quotes_follow_rate_table() {
        let quoter = StubShippingQuoter::new();
        let quotes = quoter.get_quote(None, &destination(), 1000).await.unwrap();

        assert_eq!(quotes.len(), 5);
        assert_eq!(quotes[0].carrier, "USPS");
        assert_eq!(quotes[0].cost, Money::from_cents(650));
        assert_eq!(quotes[3].cost, Money::from_cents(850));
        assert_eq!(StubShippingQuoter::preferred_cost(1000), quotes[0].cost);
    }

    #[tokio::test]
    async fn test_zero_weight_is_rejected() {
        let quoter = StubShippingQuoter::new();
        assert!(quoter.get_quote(None, &destination(), 0).await.is_err());
    }

    #[tokio::test]
    async fn test_toggles() {
        let quoter = StubShippingQuoter::new();
        quoter.set_return_empty(true);
        assert!(quoter.get_quote(None, &destination(), 1000).await.unwrap().is_empty());

        quoter.set_fail(true);
        assert!(quoter.get_quote(None, &destination(), 1000).await.is_err());
        assert_eq!(quoter.calls(), 2);
    }
}
