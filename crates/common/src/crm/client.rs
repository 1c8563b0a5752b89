use crate::crm::SalesforceConfig;
use crate::domain::{CrmResponse, DomainError, DomainResult, FieldMap};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Deserialize)]
struct SalesforceSession {
    access_token: String,
    instance_url: String,
}

/// Authenticated HTTP client for the Salesforce REST API.
///
/// The access token is acquired lazily on first use and cached. A `401`
/// drops the cached token, re-authenticates and retries the call once.
pub struct SalesforceClient {
    http: reqwest::Client,
    config: SalesforceConfig,
    session: RwLock<Option<SalesforceSession>>,
}

impl SalesforceClient {
    pub fn new(config: SalesforceConfig) -> DomainResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DomainError::CrmTransport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            session: RwLock::new(None),
        })
    }

    /// Send `method` to `{instance}/services/data/{version}/{path...}` and
    /// return whatever status the CRM answered with.
    ///
    /// Each element of `path` is percent-encoded as a single segment, so a
    /// value containing `/`, `?` or `#` cannot leave its segment.
    #[instrument(skip(self, body))]
    pub async fn send(
        &self,
        method: Method,
        path: &[&str],
        body: Option<&FieldMap>,
    ) -> DomainResult<CrmResponse> {
        let session = self.session().await?;
        let response = self.execute(&session, method.clone(), path, body).await?;

        if response.status != StatusCode::UNAUTHORIZED.as_u16() {
            return Ok(response);
        }

        warn!("access token rejected, re-authenticating");
        self.invalidate(&session.access_token).await;
        let session = self.session().await?;
        self.execute(&session, method, path, body).await
    }

    async fn execute(
        &self,
        session: &SalesforceSession,
        method: Method,
        path: &[&str],
        body: Option<&FieldMap>,
    ) -> DomainResult<CrmResponse> {
        let url = self.resource_url(&session.instance_url, path)?;

        let mut request = self
            .http
            .request(method, url.clone())
            .bearer_auth(&session.access_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DomainError::CrmTransport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| DomainError::CrmTransport(format!("failed to read response body: {}", e)))?;

        debug!(status, url = %url, "crm call completed");
        Ok(CrmResponse::new(status, body))
    }

    fn resource_url(&self, instance_url: &str, path: &[&str]) -> DomainResult<Url> {
        let mut url = Url::parse(instance_url).map_err(|e| {
            DomainError::CrmTransport(format!("invalid instance url '{}': {}", instance_url, e))
        })?;

        url.path_segments_mut()
            .map_err(|_| {
                DomainError::CrmTransport(format!("instance url '{}' cannot take a path", instance_url))
            })?
            .pop_if_empty()
            .extend(["services", "data", self.config.api_version.as_str()])
            .extend(path);

        Ok(url)
    }

    async fn session(&self) -> DomainResult<SalesforceSession> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.clone());
        }

        let mut guard = self.session.write().await;
        // Another caller may have authenticated while we waited for the lock
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let session = self.authenticate().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn invalidate(&self, stale_token: &str) {
        let mut guard = self.session.write().await;
        if guard
            .as_ref()
            .is_some_and(|session| session.access_token == stale_token)
        {
            *guard = None;
        }
    }

    async fn authenticate(&self) -> DomainResult<SalesforceSession> {
        info!(login_url = %self.config.login_url, username = %self.config.username, "authenticating with Salesforce");

        let password = format!("{}{}", self.config.password, self.config.security_token);
        let params = [
            ("grant_type", "password"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("username", self.config.username.as_str()),
            ("password", password.as_str()),
        ];

        let response = self
            .http
            .post(self.config.token_url())
            .form(&params)
            .send()
            .await
            .map_err(|e| DomainError::CrmAuthentication(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::CrmAuthentication(format!(
                "token request failed with status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let session = response
            .json::<SalesforceSession>()
            .await
            .map_err(|e| DomainError::CrmAuthentication(format!("invalid token response: {}", e)))?;

        info!(instance_url = %session.instance_url, "authenticated with Salesforce");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SalesforceClient {
        SalesforceClient::new(SalesforceConfig::default()).unwrap()
    }

    #[test]
    fn test_resource_url_joins_version_and_path() {
        let url = client()
            .resource_url("https://eu1.my.salesforce.com/", &["sobjects", "Contact", "003ABC"])
            .unwrap();

        assert_eq!(
            url.as_str(),
            format!(
                "https://eu1.my.salesforce.com/services/data/{}/sobjects/Contact/003ABC",
                SalesforceConfig::default().api_version
            )
        );
    }

    #[test]
    fn test_resource_url_keeps_each_element_in_one_segment() {
        let url = client()
            .resource_url(
                "https://eu1.my.salesforce.com",
                &["sobjects", "Contact", "003X/../../Account/001EVIL?x=1#y"],
            )
            .unwrap();

        assert!(url
            .path()
            .ends_with("/sobjects/Contact/003X%2F..%2F..%2FAccount%2F001EVIL%3Fx=1%23y"));
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
        assert_eq!(url.path_segments().unwrap().count(), 6);
    }

    #[test]
    fn test_resource_url_rejects_garbage_instance_url() {
        assert!(matches!(
            client().resource_url("not a url", &["sobjects"]),
            Err(DomainError::CrmTransport(_))
        ));
    }
}
