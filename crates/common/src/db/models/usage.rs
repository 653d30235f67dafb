//! Usage counters entity

use crate::usage::UsageRecord;
use chrono::Utc;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "usage")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub uid: String,

    pub last_session_seconds: i64,

    pub last_session_messages: i64,

    /// Cumulative; only ever incremented
    pub total_session_seconds: i64,

    /// Cumulative; only ever incremented
    pub total_messages: i64,

    pub last_updated: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for UsageRecord {
    fn from(model: Model) -> Self {
        Self {
            uid: model.uid,
            last_session_seconds: model.last_session_seconds.max(0) as u64,
            last_session_messages: model.last_session_messages.max(0) as u64,
            total_session_seconds: model.total_session_seconds.max(0) as u64,
            total_messages: model.total_messages.max(0) as u64,
            last_updated: model.last_updated.map(|ts| ts.with_timezone(&Utc)),
        }
    }
}
