#![cfg_attr(not(test), no_std)]

pub mod bus;
pub mod config;
pub mod error;
pub mod health;
pub mod registry;
pub mod sensors;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod telemetry;
pub mod time;
