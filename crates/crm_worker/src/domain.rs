mod crm_gateway;
mod dispatcher;
mod entity_sync_service;
mod intent;

pub use crm_gateway::*;
pub use dispatcher::*;
pub use entity_sync_service::*;
pub use intent::*;
