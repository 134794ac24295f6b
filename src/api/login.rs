use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use crate::core::config::ControllerConfig;
use crate::core::error::AuthError;

/// HTTP client for the controller's login endpoint
pub struct LoginClient {
    client: reqwest::Client,
}

/// Build the `Authorization` value for HTTP Basic credentials
pub fn basic_auth_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

impl LoginClient {
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AuthError::Client)?;

        Ok(Self { client })
    }

    /// Log in to a controller.
    ///
    /// Returns the authorization header value to present when opening the
    /// controller's socket. A 401 is reported as bad credentials; any other
    /// non-success status is unexpected.
    pub async fn login(&self, controller: &ControllerConfig) -> Result<String, AuthError> {
        let auth = basic_auth_header(&controller.username, &controller.password);

        let response = self
            .client
            .get(controller.login_url())
            .header(AUTHORIZATION, &auth)
            .send()
            .await
            .map_err(|source| AuthError::Request {
                host: controller.host.clone(),
                source,
            })?;

        let status = response.status();
        debug!(host = %controller.host, status = %status, "Login response");

        match status {
            StatusCode::OK => Ok(auth),
            StatusCode::UNAUTHORIZED => Err(AuthError::BadCredentials {
                host: controller.host.clone(),
            }),
            other => Err(AuthError::UnexpectedStatus {
                host: controller.host.clone(),
                status: other.as_u16(),
            }),
        }
    }
}
