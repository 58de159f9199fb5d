//! Repository layer encapsulating SeaORM operations.

pub mod integration;
pub mod security_event;

pub use integration::IntegrationRepository;
pub use security_event::SecurityEventRepository;
