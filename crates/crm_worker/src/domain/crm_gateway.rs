use crate::domain::CrmIntent;
use common::domain::{CrmApi, CrmOperation, CrmResponse, DomainError, DomainResult, EntityKind, FieldMap};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// CRM calls for one entity kind with a fixed success status per operation:
/// create 201, get 200, update and delete 204.
///
/// Any other status becomes [`DomainError::CrmCallFailure`] carrying the
/// response body; CRM error codes are not interpreted further.
#[derive(Clone)]
pub struct CrmOperationGateway {
    entity: EntityKind,
    api: Arc<dyn CrmApi>,
}

impl CrmOperationGateway {
    pub fn new(entity: EntityKind, api: Arc<dyn CrmApi>) -> Self {
        Self { entity, api }
    }

    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    pub async fn create(&self, body: &FieldMap) -> DomainResult<CrmResponse> {
        let response = self.api.create(body).await?;
        self.check_status(CrmOperation::Create, response)
    }

    pub async fn get(&self, id: &str) -> DomainResult<CrmResponse> {
        let response = self.api.get(id).await?;
        self.check_status(CrmOperation::Get, response)
    }

    pub async fn update(&self, id: &str, body: &FieldMap) -> DomainResult<CrmResponse> {
        let response = self.api.update(id, body).await?;
        self.check_status(CrmOperation::Update, response)
    }

    pub async fn delete(&self, id: &str) -> DomainResult<CrmResponse> {
        let response = self.api.delete(id).await?;
        self.check_status(CrmOperation::Delete, response)
    }

    #[instrument(skip(self, intent), fields(entity = %self.entity, operation = %intent.operation(), id = intent.id().unwrap_or("")))]
    pub async fn execute(&self, intent: &CrmIntent) -> DomainResult<CrmResponse> {
        match intent {
            CrmIntent::Create { body } => self.create(body).await,
            CrmIntent::Update { id, body } => self.update(id, body).await,
            CrmIntent::Delete { id } => self.delete(id).await,
        }
    }

    fn check_status(&self, operation: CrmOperation, response: CrmResponse) -> DomainResult<CrmResponse> {
        if response.status == operation.success_status() {
            debug!(entity = %self.entity, operation = %operation, status = response.status, "crm call succeeded");
            return Ok(response);
        }

        warn!(
            entity = %self.entity,
            operation = %operation,
            status = response.status,
            expected = operation.success_status(),
            body = %response.body,
            "crm call failed"
        );
        Err(DomainError::CrmCallFailure {
            operation: operation.to_string(),
            status: response.status,
            body: response.body,
        })
    }
}
