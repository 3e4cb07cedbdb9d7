//! Retry module
//! - policy.rs: backoff policy and the executor that applies it
//! - provider.rs: `ChatProvider` decorator retrying stream establishment

pub mod policy;
pub mod provider;

pub use policy::*;
pub use provider::*;
