// Quizzard Gateway - authenticated request gateway for the Quizzard API

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
