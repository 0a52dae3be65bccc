pub mod aicore;
pub mod api;
pub mod audit;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod store;
pub mod validation;
