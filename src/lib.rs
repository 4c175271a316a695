pub mod biometric;
pub mod config;
pub mod error;
pub mod identity;
pub mod interaction;
pub mod server;
