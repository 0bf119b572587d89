// rest_api/src/handlers/mod.rs

pub mod auth;
pub mod emergency;
pub mod records;
pub mod sharing;
