//! Security layer wrapped around every tool call.
//!
//! # Data Flow
//! ```text
//! tools/call:
//!     → request.rs   (rate, input size, string length, mapping check)
//!     → profile.rs   (sanitize strings, optional path prefixes)
//!     → governor.rs  (effective timeout = min(requested, ceiling))
//!     → tool runs on the blocking pool
//!     → response.rs  (size truncation, line truncation, output byte window)
//! ```
//!
//! Every check fails closed. Limits come from a single [`SecurityPolicy`]
//! loaded at startup and never mutated afterwards.

pub mod governor;
pub mod middleware;
pub mod policy;
pub mod profile;
pub mod rate_limit;
pub mod request;
pub mod response;

pub use governor::{ExecutionGovernor, TimeoutDecision};
pub use middleware::SecurityMiddleware;
pub use policy::SecurityPolicy;
pub use profile::{sanitize_input, sanitize_value, ToolSecurityProfile};
pub use rate_limit::{OutputRateLimiter, TokenBucket};
pub use request::RequestValidator;
pub use response::{ResponseValidator, ValidatedResponse};
