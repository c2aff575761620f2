//! Caching and address-resolution layers

pub mod cache;
pub mod resolver;

pub use cache::{
    value_cache_ttl, ModuleBaseCache, ResolvedAddressCache, TtlCache, ValueCache,
    ADDRESS_CACHE_TTL, MODULE_CACHE_TTL, SWEEP_INTERVAL, VALUE_CACHE_MIN_TTL,
};
pub use resolver::{execute_request, module_base, read_value, resolve_address};
