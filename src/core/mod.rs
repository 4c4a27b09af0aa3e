//! Core provisioning logic

pub mod controller;
pub mod error;
pub mod types;
