//! Database migrations for the Wellness Reports service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_11_20_000100_create_integration_tokens;
mod m2025_11_20_000200_create_reports;
mod m2025_11_20_000300_create_email_log;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_11_20_000100_create_integration_tokens::Migration),
            Box::new(m2025_11_20_000200_create_reports::Migration),
            Box::new(m2025_11_20_000300_create_email_log::Migration),
        ]
    }
}
