//! Verdant: plant-care backend service.
//!
//! Single Rust binary. A periodic sweep recomputes each plant's health
//! status from its watering history, tracks achievement progress, and sends
//! push notifications when plants need water. The classification core is
//! pure and clock-injected; persistence and delivery are swappable
//! collaborators around it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;

pub mod achievements;
pub mod health;

pub mod push;
pub mod store;
pub mod sweep;
