use crate::domain::{CrmOperationGateway, EntityDispatcher};
use common::domain::{CrmResponse, DomainResult, EntityKind};
use tracing::{debug, instrument};

/// Runs one delivery through dispatch and the CRM call.
///
/// Any error means the delivery must not be acknowledged.
pub struct EntitySyncService {
    dispatcher: EntityDispatcher,
    gateway: CrmOperationGateway,
}

impl EntitySyncService {
    pub fn new(dispatcher: EntityDispatcher, gateway: CrmOperationGateway) -> Self {
        Self {
            dispatcher,
            gateway,
        }
    }

    pub fn entity(&self) -> EntityKind {
        self.dispatcher.entity()
    }

    #[instrument(skip(self, payload), fields(entity = %self.dispatcher.entity(), payload_size = payload.len()))]
    pub async fn sync(&self, routing_key: &str, payload: &[u8]) -> DomainResult<CrmResponse> {
        let intent = self.dispatcher.dispatch(routing_key, payload)?;
        debug!(operation = %intent.operation(), id = intent.id().unwrap_or(""), "dispatched intent");

        self.gateway.execute(&intent).await
    }
}
