//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Patient access request:
//!     → validators.rs (DNI and code shape)
//!     → rate_limit.rs (per-IP attempt window)
//!     → codes.rs (hash the code before it leaves the process)
//!     → data platform
//!
//! Every response:
//!     → headers.rs (nosniff, no-store, frame and referrer policy)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any failed check
//! - Plaintext codes and tokens never reach logs
//! - Limiter state is per process

pub mod codes;
pub mod headers;
pub mod rate_limit;
pub mod validators;
