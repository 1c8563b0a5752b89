mod heartbeat;
mod producer;

pub use heartbeat::*;
pub use producer::*;
