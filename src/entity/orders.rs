use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub order_number: String,
    pub session_id: Option<String>,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_line_id: Option<String>,
    pub shipping_method: String,
    pub store_name: Option<String>,
    pub store_number: Option<String>,
    pub store_address: Option<String>,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub discount: i64,
    pub total: i64,
    pub status: String,
    pub coupon_code: Option<String>,
    pub notification_sent: bool,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_items::Entity")]
    OrderItems,
}

impl Related<super::order_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
