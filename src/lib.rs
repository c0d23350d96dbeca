// Library exports for soshi
// This allows integration tests and external code to use soshi modules

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod visibility;
