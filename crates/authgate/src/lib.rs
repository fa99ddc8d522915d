//! Authgate library.
//!
//! Session-based authentication and role-based page gating for a web app.

pub mod api;
pub mod auth;
