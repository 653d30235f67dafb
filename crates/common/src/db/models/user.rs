//! User profile entity

use crate::profile::UserProfile;
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub uid: String,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub email: String,

    #[sea_orm(column_type = "Text")]
    pub picture: String,

    pub created_at: DateTimeWithTimeZone,

    pub last_login_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for UserProfile {
    fn from(model: Model) -> Self {
        Self {
            uid: model.uid,
            name: model.name,
            email: model.email,
            picture: model.picture,
            created_at: model.created_at.with_timezone(&Utc),
            last_login_at: model.last_login_at.with_timezone(&Utc),
        }
    }
}

impl From<&UserProfile> for ActiveModel {
    fn from(profile: &UserProfile) -> Self {
        Self {
            uid: Set(profile.uid.clone()),
            name: Set(profile.name.clone()),
            email: Set(profile.email.clone()),
            picture: Set(profile.picture.clone()),
            created_at: Set(profile.created_at.into()),
            last_login_at: Set(profile.last_login_at.into()),
        }
    }
}
