//! Request extractors

pub mod auth;
pub mod source;
