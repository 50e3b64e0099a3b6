use sea_orm::entity::prelude::*;

/// 设备实体
pub mod device {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "devices")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub ip_address: String,
        #[sea_orm(primary_key, auto_increment = false)]
        pub port: i32,
        pub label: Option<String>,
        pub device_type: String,
        pub refresh_rate: i32,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
