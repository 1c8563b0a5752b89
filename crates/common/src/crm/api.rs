use crate::crm::SalesforceClient;
use crate::domain::{CrmApi, CrmResponse, DomainResult, EntityKind, FieldMap};
use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;

/// Default SObject backing each entity kind
pub fn default_sobject(entity: EntityKind) -> &'static str {
    match entity {
        EntityKind::User => "Contact",
        EntityKind::Company => "Account",
    }
}

/// [`CrmApi`] over one Salesforce SObject type
pub struct SalesforceObjectApi {
    client: Arc<SalesforceClient>,
    sobject: String,
}

impl SalesforceObjectApi {
    pub fn new(client: Arc<SalesforceClient>, sobject: impl Into<String>) -> Self {
        Self {
            client,
            sobject: sobject.into(),
        }
    }

    pub fn sobject(&self) -> &str {
        &self.sobject
    }

    fn collection_path(&self) -> [&str; 2] {
        ["sobjects", self.sobject.as_str()]
    }

    /// The id is one path segment; the client encodes it as such
    fn record_path<'a>(&'a self, id: &'a str) -> [&'a str; 3] {
        ["sobjects", self.sobject.as_str(), id]
    }
}

#[async_trait]
impl CrmApi for SalesforceObjectApi {
    async fn create(&self, body: &FieldMap) -> DomainResult<CrmResponse> {
        self.client
            .send(Method::POST, &self.collection_path(), Some(body))
            .await
    }

    async fn get(&self, id: &str) -> DomainResult<CrmResponse> {
        self.client
            .send(Method::GET, &self.record_path(id), None)
            .await
    }

    async fn update(&self, id: &str, body: &FieldMap) -> DomainResult<CrmResponse> {
        self.client
            .send(Method::PATCH, &self.record_path(id), Some(body))
            .await
    }

    async fn delete(&self, id: &str) -> DomainResult<CrmResponse> {
        self.client
            .send(Method::DELETE, &self.record_path(id), None)
            .await
    }
}
