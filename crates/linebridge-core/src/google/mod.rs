//! Google API credentials.

pub mod auth;

pub use auth::{
    token_source_from_config, ServiceAccountKey, ServiceAccountTokenSource, StaticTokenSource,
    TokenSource, UnconfiguredTokenSource,
};
