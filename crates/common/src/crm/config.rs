use std::fmt;
use std::time::Duration;

pub const DEFAULT_LOGIN_URL: &str = "https://login.salesforce.com";
pub const DEFAULT_API_VERSION: &str = "v60.0";

/// Credentials and endpoints for the Salesforce REST API.
///
/// Authentication uses the OAuth2 username-password flow; the security token
/// is appended to the password as Salesforce requires.
#[derive(Clone)]
pub struct SalesforceConfig {
    pub login_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub security_token: String,
    pub api_version: String,
    pub request_timeout: Duration,
}

impl SalesforceConfig {
    pub fn token_url(&self) -> String {
        format!("{}/services/oauth2/token", self.login_url.trim_end_matches('/'))
    }
}

impl Default for SalesforceConfig {
    fn default() -> Self {
        Self {
            login_url: DEFAULT_LOGIN_URL.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            username: String::new(),
            password: String::new(),
            security_token: String::new(),
            api_version: DEFAULT_API_VERSION.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for SalesforceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SalesforceConfig")
            .field("login_url", &self.login_url)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("api_version", &self.api_version)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
