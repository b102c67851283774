//! Route modules for Asset Relay Server

pub mod health;
pub mod stars;
pub mod upload;
