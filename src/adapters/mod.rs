//! Provider adapter implementations
//!
//! Each calendar provider gets an adapter translating its OAuth dialect into
//! the canonical token tuple. Adapters are registered and looked up through
//! [`registry::AdapterRegistry`].

pub mod google;
pub mod microsoft;
pub mod registry;
pub mod trait_;
pub mod zoom;

pub use registry::{AdapterRegistry, RegistryError};
pub use trait_::{AdapterError, AuthorizeParams, ProviderAdapter, UserProfile};
