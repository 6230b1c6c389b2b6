//! Artifact entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "artifacts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub job_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub user_id: String,

    #[sea_orm(column_type = "Text")]
    pub source_url: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// Hex SHA-256 of the normalized text; unique per job
    #[sea_orm(column_type = "Text")]
    pub content_hash: String,

    #[sea_orm(column_type = "Text")]
    pub artifact_type: String,

    #[sea_orm(column_type = "Text")]
    pub language: String,

    #[sea_orm(column_type = "Text")]
    pub origin_source: String,

    pub is_public: bool,

    pub byte_size: i64,

    /// Key of the text blob in the blob store
    #[sea_orm(column_type = "Text")]
    pub blob_key: String,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub analysis: Option<Json>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::scrape_job::Entity",
        from = "Column::JobId",
        to = "super::scrape_job::Column::Id"
    )]
    ScrapeJob,
}

impl Related<super::scrape_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ScrapeJob.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
