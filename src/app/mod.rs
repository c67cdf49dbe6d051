//! Binary-side wiring: settings, secrets, the HTTP surface and the progress UI.

pub(crate) mod config;
pub(crate) mod progress;
pub(crate) mod runtime;
pub(crate) mod server;
