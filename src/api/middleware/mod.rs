//! API middleware.
//!
//! Protected routes run the identity check before any handler.

pub mod identity;
