mod log_event;
mod log_publisher;

pub use log_event::*;
pub use log_publisher::*;
