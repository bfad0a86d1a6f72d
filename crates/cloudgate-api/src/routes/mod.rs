//! API Routes

pub mod activations;
pub mod health;
