//! SeaORM entity models
//!
//! Document collections backed by Postgres tables

mod user;
mod usage;

pub use user::{
    Entity as UserEntity,
    Model as UserModel,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};

pub use usage::{
    Entity as UsageEntity,
    Model as UsageModel,
    Column as UsageColumn,
};
