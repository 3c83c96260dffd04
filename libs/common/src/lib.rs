//! Common library for the NextDrink services
//!
//! This crate provides the infrastructure shared by the auth and api
//! services: layered settings, PostgreSQL connectivity and migrations, the
//! Redis cache, token verification and the matching error types.

pub mod cache;
pub mod database;
pub mod error;
pub mod settings;
pub mod token;
