//! Error handling for esdump.
//!
//! Every fallible operation in the crate returns [`Result`], whose error is the
//! tagged [`DumpError`]. Variants keep their cause (`source()` chains through
//! to the underlying transport, JSON or I/O error) and, for cluster failures,
//! the status code and decoded diagnostic body.
//!
//! # Example
//!
//! ```rust
//! use esdump::error::{DumpError, ValidationError};
//!
//! let err: DumpError = ValidationError::MissingField("time_field").into();
//! assert!(err.is_validation());
//! assert_eq!(err.to_string(), "Invalid query: missing required field `time_field`");
//! ```

pub mod kinds;

pub use kinds::{ConfigError, DumpError, Result, ValidationError};
