//! HTTP pipeline: stages, route groups and shared state.
//!
//! # Responsibilities
//! - Assemble the ordered request pipeline around the route groups.
//! - Carry per-request state between stages in a [`context::RequestContext`].
//! - Turn every failure into the rendered `error` view.

pub mod context;
pub mod errors;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod state;

#[cfg(test)]
pub mod testing;
