//! Configuration: the immutable snapshot, its typestate builder, and the
//! environment-loading entry point used by `main`.

mod builder;
mod env;
mod types;

pub use builder::{ProxyConfigBuilder, Unset, WithTargetUrl};
pub use env::load;
pub use types::{
    CacheBackendKind, ProxyConfig, BLOCKED_RESOURCE_TYPES, DEFAULT_BLOCKED_DOMAINS,
    DEFAULT_BLOCKED_PATH_SUBSTRINGS,
};
