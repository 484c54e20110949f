use chrono::{DateTime, Months, Utc};
use common::error::{AppError, Res};

/// Billing period inferred from a store product id such as `premium_monthly`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductPlan {
    Monthly,
    Yearly,
    Lifetime,
}

impl ProductPlan {
    /// Unknown product ids are billed as monthly.
    pub fn from_product_id(product_id: &str) -> Self {
        let product_id = product_id.to_lowercase();
        if product_id.contains("monthly") {
            ProductPlan::Monthly
        } else if product_id.contains("yearly") {
            ProductPlan::Yearly
        } else if product_id.contains("lifetime") {
            ProductPlan::Lifetime
        } else {
            ProductPlan::Monthly
        }
    }

    /// End of the paid period, `None` for purchases that never expire.
    pub fn end_date(&self, start: DateTime<Utc>) -> Res<Option<DateTime<Utc>>> {
        let months = match self {
            ProductPlan::Monthly => 1,
            ProductPlan::Yearly => 12,
            ProductPlan::Lifetime => return Ok(None),
        };
        start
            .checked_add_months(Months::new(months))
            .map(Some)
            .ok_or_else(|| AppError::Internal("Subscription end date overflows".to_string()))
    }

    pub fn auto_renewing(&self) -> bool {
        !matches!(self, ProductPlan::Lifetime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn product_id_selects_period() {
        assert_eq!(ProductPlan::from_product_id("premium_monthly"), ProductPlan::Monthly);
        assert_eq!(ProductPlan::from_product_id("premium_yearly"), ProductPlan::Yearly);
        assert_eq!(ProductPlan::from_product_id("premium_lifetime"), ProductPlan::Lifetime);
        assert_eq!(ProductPlan::from_product_id("premium"), ProductPlan::Monthly);
    }

    #[test]
    fn end_date_follows_calendar() {
        let start = Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap();
        assert_eq!(
            ProductPlan::Monthly.end_date(start).unwrap(),
            Some(Utc.with_ymd_and_hms(2025, 2, 28, 12, 0, 0).unwrap())
        );
        assert_eq!(
            ProductPlan::Yearly.end_date(start).unwrap(),
            Some(Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap())
        );
        assert_eq!(ProductPlan::Lifetime.end_date(start).unwrap(), None);
        assert!(!ProductPlan::Lifetime.auto_renewing());
        assert!(ProductPlan::Yearly.auto_renewing());
    }
}
