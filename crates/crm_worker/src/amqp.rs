mod entity_consumer_service;

pub use entity_consumer_service::*;
