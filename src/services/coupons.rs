//! Coupon engine: validation predicates and discount computation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{coupon, Coupon, CouponModel, DiscountType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

#[derive(Debug, Deserialize)]
pub struct CreateCouponInput {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub expiry_date: DateTime<Utc>,
    #[serde(default)]
    pub max_usage: i32,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateCouponInput {
    pub value: Option<Decimal>,
    pub is_active: Option<bool>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub max_usage: Option<i32>,
    pub description: Option<String>,
}

/// Result of applying a coupon to a total.
#[derive(Debug, Clone, Serialize)]
pub struct CouponQuote {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub discount: Decimal,
    pub final_total: Decimal,
}

/// Discount for `total`, clamped so the final total never goes negative.
/// Pure function of the coupon and the total.
pub fn compute_discount(
    discount_type: DiscountType,
    value: Decimal,
    total: Decimal,
) -> (Decimal, Decimal) {
    let raw = match discount_type {
        DiscountType::Percentage => total * value / Decimal::from(100),
        DiscountType::Fixed => value,
    };
    let discount = raw.min(total);
    (discount, total - discount)
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(&self, input: CreateCouponInput) -> Result<CouponModel, ServiceError> {
        let existing = self.find_by_code(&input.code).await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(
                "Coupon code already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(input.code),
            discount_type: Set(input.discount_type),
            value: Set(input.value),
            is_active: Set(input.is_active),
            expiry_date: Set(input.expiry_date),
            usage_count: Set(0),
            max_usage: Set(input.max_usage),
            description: Set(input.description),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;
        self.event_sender
            .send_or_log(Event::CouponCreated(created.id))
            .await;
        Ok(created)
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Option<CouponModel>, ServiceError> {
        Ok(Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .one(&*self.db)
            .await?)
    }

    pub async fn list(&self) -> Result<Vec<CouponModel>, ServiceError> {
        Ok(Coupon::find()
            .order_by_asc(coupon::Column::Code)
            .all(&*self.db)
            .await?)
    }

    /// Fetches a coupon and checks the usability predicates in order:
    /// existence, active flag, expiry, usage cap.
    #[instrument(skip(self))]
    pub async fn validate(&self, code: &str) -> Result<CouponModel, ServiceError> {
        let coupon = self
            .find_by_code(code)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Coupon not found".to_string()))?;

        if !coupon.is_active {
            return Err(ServiceError::InvalidOperation(
                "Coupon is not active".to_string(),
            ));
        }
        if coupon.expiry_date <= Utc::now() {
            return Err(ServiceError::InvalidOperation(
                "Coupon has expired".to_string(),
            ));
        }
        if coupon.max_usage > 0 && coupon.usage_count >= coupon.max_usage {
            return Err(ServiceError::InvalidOperation(
                "Coupon usage limit reached".to_string(),
            ));
        }

        Ok(coupon)
    }

    /// Validates `code` and quotes the discount for `total`. Has no side
    /// effect on usage counters; those are advanced once at settlement.
    #[instrument(skip(self))]
    pub async fn apply(&self, code: &str, total: Decimal) -> Result<CouponQuote, ServiceError> {
        let coupon = self.validate(code).await?;
        let (discount, final_total) = compute_discount(coupon.discount_type, coupon.value, total);

        Ok(CouponQuote {
            code: coupon.code,
            discount_type: coupon.discount_type,
            value: coupon.value,
            discount,
            final_total,
        })
    }

    /// Advances the usage counter by one, atomically and only while the cap
    /// still allows it. A coupon exhausted between apply and settlement is
    /// logged, not failed: the order was already priced with the discount.
    #[instrument(skip(self))]
    pub async fn record_redemption(&self, code: &str) -> Result<(), ServiceError> {
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::UsageCount,
                Expr::col(coupon::Column::UsageCount).add(1),
            )
            .filter(coupon::Column::Code.eq(code))
            .filter(
                Condition::any()
                    .add(coupon::Column::MaxUsage.eq(0))
                    .add(Expr::col(coupon::Column::UsageCount).lt(Expr::col(coupon::Column::MaxUsage))),
            )
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!(code, "Coupon redemption not recorded (missing or exhausted)");
        } else {
            self.event_sender
                .send_or_log(Event::CouponRedeemed {
                    code: code.to_string(),
                })
                .await;
        }
        Ok(())
    }

    pub async fn update(
        &self,
        coupon_id: Uuid,
        input: UpdateCouponInput,
    ) -> Result<CouponModel, ServiceError> {
        let existing = Coupon::find_by_id(coupon_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Coupon not found".to_string()))?;

        let mut active: coupon::ActiveModel = existing.into();
        if let Some(value) = input.value {
            active.value = Set(value);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(expiry_date) = input.expiry_date {
            active.expiry_date = Set(expiry_date);
        }
        if let Some(max_usage) = input.max_usage {
            active.max_usage = Set(max_usage);
        }
        if input.description.is_some() {
            active.description = Set(input.description);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    pub async fn remove(&self, coupon_id: Uuid) -> Result<(), ServiceError> {
        let result = Coupon::delete_by_id(coupon_id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Coupon not found".to_string()));
        }
        info!(coupon_id = %coupon_id, "Deleted coupon");
        Ok(())
    }
}
