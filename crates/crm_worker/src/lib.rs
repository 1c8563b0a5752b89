pub mod amqp;
pub mod crm_worker;
pub mod domain;

pub use amqp::*;
pub use crm_worker::*;
pub use domain::*;
