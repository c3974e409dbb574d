//! HTTP middleware: optional API-key auth and sampled request logging.

pub mod auth;
pub mod logging;
