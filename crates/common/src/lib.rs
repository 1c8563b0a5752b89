pub mod amqp;
pub mod crm;
pub mod domain;
pub mod monitoring;
pub mod telemetry;
pub mod xml;

pub use amqp::*;
pub use crm::*;
pub use domain::*;
pub use monitoring::*;
pub use xml::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use amqp::MockDeliveryAcker;
#[cfg(any(test, feature = "testing"))]
pub use amqp::MockMessagePublisher;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockCrmApi;
