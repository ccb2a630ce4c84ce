//! Streamgate-Common: Shared types, identifiers, and errors.
//!
//! This crate provides the vocabulary used across streamgate:
//!
//! - **Reference tuples**: the minimal triple that identifies a stored object
//! - **Descriptors**: resolved file metadata (location, size, mime, name)
//! - **Path utilities**: mime guessing by file extension
//! - **Error Handling**: the request-scoped error taxonomy and its HTTP mapping
//!
//! # Examples
//!
//! ```
//! use streamgate_common::{Error, ReferenceTuple, Result};
//!
//! let tuple = ReferenceTuple::new(1001, 42, "AgADbQ");
//! assert!(tuple.is_complete());
//!
//! fn example() -> Result<()> {
//!     Err(Error::object_not_found(1001, 42))
//! }
//! assert_eq!(example().unwrap_err().http_status(), 404);
//! ```

pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
