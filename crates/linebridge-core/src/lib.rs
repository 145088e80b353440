pub mod error;
pub mod types;
pub mod config;
pub mod session;
pub mod google;
pub mod provider;
pub mod intent;
pub mod fallback;
pub mod resolver;
pub mod channel;
pub mod knowledge;
pub mod service;
pub mod util;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
