pub mod domain;
pub mod heartbeat_worker;

pub use domain::*;
pub use heartbeat_worker::*;
