mod client;
mod consumer;
mod delivery;
mod error;
mod middleware;
mod publisher;
mod retry;
mod topology;
mod trace_context;
mod traits;

pub use client::*;
pub use consumer::*;
pub use delivery::*;
pub use error::*;
pub use middleware::*;
pub use publisher::*;
pub use retry::*;
pub use topology::*;
pub use trace_context::*;
pub use traits::*;
