//! Redis adapters.

mod correlation_store;

pub use correlation_store::RedisCorrelationStore;
