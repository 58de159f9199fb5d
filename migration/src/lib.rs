//! Database migrations for the Calbridge integration service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_01_10_000100_create_integrations;
mod m2026_01_10_000200_create_security_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_10_000100_create_integrations::Migration),
            Box::new(m2026_01_10_000200_create_security_events::Migration),
        ]
    }
}
