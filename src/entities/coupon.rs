use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discount coupon. Codes are case-sensitive and unique.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub discount_type: DiscountType,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub value: Decimal,
    pub is_active: bool,
    pub expiry_date: DateTime<Utc>,
    pub usage_count: i32,
    /// 0 means unlimited.
    pub max_usage: i32,
    #[sea_orm(nullable)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// A coupon is usable iff it is active, unexpired, and below its usage
    /// cap (`max_usage == 0` meaning no cap).
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.expiry_date > now
            && (self.max_usage == 0 || self.usage_count < self.max_usage)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn coupon() -> Model {
        Model {
            id: Uuid::new_v4(),
            code: "BLACKFRIDAY10".to_string(),
            discount_type: DiscountType::Percentage,
            value: dec!(10),
            is_active: true,
            expiry_date: Utc::now() + Duration::days(7),
            usage_count: 0,
            max_usage: 0,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn active_unexpired_coupon_is_usable() {
        assert!(coupon().is_usable_at(Utc::now()));
    }

    #[test]
    fn inactive_coupon_is_not_usable() {
        let mut c = coupon();
        c.is_active = false;
        assert!(!c.is_usable_at(Utc::now()));
    }

    #[test]
    fn expired_coupon_is_not_usable() {
        let mut c = coupon();
        c.expiry_date = Utc::now() - Duration::hours(1);
        assert!(!c.is_usable_at(Utc::now()));
    }

    #[test]
    fn exhausted_coupon_is_not_usable() {
        let mut c = coupon();
        c.max_usage = 100;
        c.usage_count = 100;
        assert!(!c.is_usable_at(Utc::now()));
    }

    #[test]
    fn zero_max_usage_means_unlimited() {
        let mut c = coupon();
        c.usage_count = 10_000;
        assert!(c.is_usable_at(Utc::now()));
    }
}
