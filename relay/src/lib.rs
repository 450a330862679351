pub mod api;
pub mod config;
pub mod envelope;
pub mod event;
pub mod fingerprint;
pub mod parse;
pub mod relay;
pub mod sink;
