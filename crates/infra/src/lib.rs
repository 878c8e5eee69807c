//! Infrastructure layer: storage backends, order allocation, configuration.

pub mod allocator;
pub mod catalog;
pub mod config;
pub mod retry;
pub mod store;

pub use allocator::{AllocationError, OrderAllocator};
pub use catalog::{CatalogError, CatalogService, EventWithTicketTypes};
pub use config::{AppConfig, ConfigError, DatabaseConfig, Environment};
pub use retry::{retry_transient, RetryPolicy, Retryable};
