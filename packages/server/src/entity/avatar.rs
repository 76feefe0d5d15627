use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "avatar")]
pub struct Model {
    /// External avatar id (32 hex characters).
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Blob id of the full uploaded image.
    pub origin: String,

    /// Blob id of the thumbnail. Equal to `origin` until a crop is requested.
    pub thumb: String,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
