//! Common types shared across the channel web application crates.

pub mod error;
pub mod view;

pub use error::ServiceError;
pub use view::{Identity, ViewContext};
