//! Plans and Price Table
//!
//! Maps a (plan, billing cycle) selection onto the provider's price id.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::BillingError;

/// Subscription plan tiers that can be purchased
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlanType {
    Pro,
    Enterprise,
}

impl PlanType {
    pub const ALL: [Self; 2] = [Self::Pro, Self::Enterprise];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

impl FromStr for PlanType {
    type Err = BillingError;

    /// Plan names are matched case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(BillingError::InvalidPlan),
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing interval
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    pub const ALL: [Self; 2] = [Self::Monthly, Self::Yearly];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl FromStr for BillingCycle {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(BillingError::InvalidPlan),
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price ids keyed by plan and billing cycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriceTable {
    prices: HashMap<(PlanType, BillingCycle), String>,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::empty()
            .with_price(PlanType::Pro, BillingCycle::Monthly, "price_1ProMonthly")
            .with_price(PlanType::Pro, BillingCycle::Yearly, "price_1ProYearly")
            .with_price(
                PlanType::Enterprise,
                BillingCycle::Monthly,
                "price_1EnterpriseMonthly",
            )
            .with_price(
                PlanType::Enterprise,
                BillingCycle::Yearly,
                "price_1EnterpriseYearly",
            )
    }
}

impl PriceTable {
    /// A table with no prices at all
    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    /// Builder-style insert
    #[must_use]
    pub fn with_price(mut self, plan: PlanType, cycle: BillingCycle, price_id: impl Into<String>) -> Self {
        self.prices.insert((plan, cycle), price_id.into());
        self
    }

    /// Price id for a plan/cycle pair, if one is mapped
    pub fn lookup(&self, plan: PlanType, cycle: BillingCycle) -> Option<&str> {
        self.prices.get(&(plan, cycle)).map(String::as_str)
    }

    /// Number of mapped pairs
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Name of the environment variable that overrides one entry,
    /// e.g. `STRIPE_PRICE_PRO_MONTHLY`.
    pub fn env_key(plan: PlanType, cycle: BillingCycle) -> String {
        format!(
            "STRIPE_PRICE_{}_{}",
            plan.as_str().to_uppercase(),
            cycle.as_str().to_uppercase()
        )
    }

    /// Apply overrides from a variable source. An empty value unmaps the pair.
    #[must_use]
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        for plan in PlanType::ALL {
            for cycle in BillingCycle::ALL {
                if let Some(value) = lookup(&Self::env_key(plan, cycle)) {
                    let value = value.trim();
                    if value.is_empty() {
                        self.prices.remove(&(plan, cycle));
                    } else {
                        self.prices.insert((plan, cycle), value.to_string());
                    }
                }
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prices() {
        let table = PriceTable::default();
        assert_eq!(table.len(), 4);
        assert_eq!(
            table.lookup(PlanType::Pro, BillingCycle::Monthly),
            Some("price_1ProMonthly")
        );
        assert_eq!(
            table.lookup(PlanType::Enterprise, BillingCycle::Yearly),
            Some("price_1EnterpriseYearly")
        );
    }

    #[test]
    fn test_plan_parsing_is_case_insensitive() {
        assert_eq!("Pro".parse::<PlanType>().unwrap(), PlanType::Pro);
        assert_eq!("ENTERPRISE".parse::<PlanType>().unwrap(), PlanType::Enterprise);
        assert!(matches!(
            "free".parse::<PlanType>(),
            Err(BillingError::InvalidPlan)
        ));
    }

    #[test]
    fn test_cycle_parsing_is_exact() {
        assert_eq!("yearly".parse::<BillingCycle>().unwrap(), BillingCycle::Yearly);
        assert!("Yearly".parse::<BillingCycle>().is_err());
        assert!("weekly".parse::<BillingCycle>().is_err());
    }

    #[test]
    fn test_overrides() {
        let table = PriceTable::default().with_overrides(|key| match key {
            "STRIPE_PRICE_PRO_MONTHLY" => Some("price_live_pro".into()),
            "STRIPE_PRICE_ENTERPRISE_YEARLY" => Some("  ".into()),
            _ => None,
        });

        assert_eq!(
            table.lookup(PlanType::Pro, BillingCycle::Monthly),
            Some("price_live_pro")
        );
        assert_eq!(table.lookup(PlanType::Enterprise, BillingCycle::Yearly), None);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_env_key() {
        assert_eq!(
            PriceTable::env_key(PlanType::Enterprise, BillingCycle::Monthly),
            "STRIPE_PRICE_ENTERPRISE_MONTHLY"
        );
    }
}
