mod api;
mod client;
mod config;

pub use api::*;
pub use client::*;
pub use config::*;
