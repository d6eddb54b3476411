//! Domain layer for the memharness session engine
//!
//! This module contains the configuration model and the port traits the
//! engine is written against.

pub mod models;
pub mod ports;
