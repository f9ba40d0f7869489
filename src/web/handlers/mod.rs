//! # Web API Request Handlers

pub mod health;
pub mod orders;
