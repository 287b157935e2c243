use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Product catalog entry. The `stock` column is the single source of truth
/// for availability and is only mutated through the stock ledger.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    /// Percentage off the list price, 0..=100.
    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub discount_percent: Decimal,
    pub stock: i32,
    /// Available size variants, e.g. `["S", "M", "L"]`.
    #[sea_orm(column_type = "Json")]
    pub sizes: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Effective unit price after the product-level discount.
    pub fn final_price(&self) -> Decimal {
        self.price - self.price * self.discount_percent / Decimal::from(100)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(price: Decimal, discount_percent: Decimal) -> Model {
        Model {
            id: Uuid::new_v4(),
            name: "Away Jersey".to_string(),
            description: String::new(),
            price,
            discount_percent,
            stock: 10,
            sizes: serde_json::json!(["S", "M"]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn final_price_applies_percentage_discount() {
        assert_eq!(product(dec!(200), dec!(10)).final_price(), dec!(180));
    }

    #[test]
    fn final_price_without_discount_is_list_price() {
        assert_eq!(product(dec!(49.99), dec!(0)).final_price(), dec!(49.99));
    }

    #[test]
    fn full_discount_prices_at_zero() {
        assert_eq!(product(dec!(80), dec!(100)).final_price(), dec!(0));
    }
}
