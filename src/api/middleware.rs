//! Middleware modules for the API

pub mod logging;
