//! Error Handling Module
//!
//! This module provides the error taxonomy shared by every layer of the relay:
//! - Core error type (`LlmError`) with its `ErrorCategory` and `UpstreamErrorKind`
//! - Status-code based classification of upstream HTTP failures
//! - Type conversions from common error types
//!
//! # Example
//!
//! ```rust,ignore
//! use showmyai::error::{classify_http_error, UpstreamErrorKind};
//!
//! let error = classify_http_error("OpenAI", "gpt-4o", 429, "");
//! assert_eq!(error.upstream_kind(), Some(UpstreamErrorKind::RateLimited));
//! ```

// Module declarations
mod conversions;
pub mod helpers;
pub mod types;

// Re-exports for public API
pub use helpers::*;
pub use types::*;
