//! Router Module Index
//!
//! Routing is split by access level. Authentication is applied to a whole router as a
//! layer, so a protected endpoint cannot be exposed by forgetting an extractor.
//! Ownership (owner-or-admin) is decided inside the handlers, per resource.

/// Routes open to anonymous clients: login, signup and every read.
pub mod public;

/// Routes behind the bearer-token layer: every mutation and the caller's own account.
pub mod authenticated;
