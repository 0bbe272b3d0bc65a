//! API Routes
//!
//! Route handlers organized by functionality.

pub mod connections;
pub mod health;
pub mod rooms;
