//! Domain building blocks shared by every docconv crate.
//!
//! Holds the identifier/timestamp aliases, the domain error type, and the
//! naming rules that decide which uploads are accepted and what their
//! converted outputs are called.

pub mod error;
pub mod naming;
pub mod types;
