//! Main SkySync cloud client.

use crate::error::{ClientError, Result};
use crate::types::{
    RegisterRequest, RegisterResponse, Session, UploadRequest, UploadResponse, VerifyRequest,
    VerifyResponse,
};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Client for the SkySync cloud service.
///
/// Holds a cookie-aware HTTP client; the service identifies live sessions
/// through an XSRF cookie issued on first contact (see
/// [`CloudClient::open_session`]).
pub struct CloudClient {
    http: Client,
    base_url: String,
}

impl CloudClient {
    /// Create a new client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(ClientError::InvalidUrl("URL cannot be empty".into()));
        }

        let base_url = base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ClientError::InvalidUrl(
                "URL must start with http:// or https://".into(),
            ));
        }

        let http = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("SkySync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Request)?;

        Ok(Self { http, base_url })
    }

    /// The base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Establish a session with the service.
    ///
    /// A plain GET against the base URL; the service answers with an
    /// `_xsrf` cookie which doubles as the session token. Returns
    /// `ClientError::Session` if the cookie is missing, which callers
    /// treat as "try again next tick".
    pub async fn open_session(&self) -> Result<Session> {
        let url = format!("{}/", self.base_url);
        debug!(url = %url, "Opening cloud session");

        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::ServerError {
                status: status.as_u16(),
                message,
            });
        }

        let xsrf = response
            .cookies()
            .find(|c| c.name() == "_xsrf")
            .map(|c| c.value().to_string())
            .ok_or_else(|| ClientError::Session("no _xsrf cookie in response".into()))?;

        debug!("Cloud session established");
        Ok(Session { xsrf })
    }

    /// Register this agent's public key with the service.
    pub async fn register(
        &self,
        session: &Session,
        email: &str,
        public_key_b64: &str,
        fingerprint_b64: &str,
    ) -> Result<RegisterResponse> {
        let url = format!("{}/register", self.base_url);
        debug!(url = %url, email = %email, "Attempting registration");

        let request = RegisterRequest {
            email: email.to_string(),
            public_key: public_key_b64.to_string(),
            public_key_fingerprint: fingerprint_b64.to_string(),
            xsrf: session.xsrf.clone(),
        };

        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();

        if status.is_success() {
            let body: RegisterResponse = response
                .json()
                .await
                .map_err(|e| ClientError::Parse(format!("register response: {}", e)))?;
            info!("Registration accepted by server");
            Ok(body)
        } else {
            let message = response.text().await.unwrap_or_default();
            warn!(status = %status, "Registration rejected");
            Err(ClientError::ServerError {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Ask the service whether this agent's account has been verified.
    pub async fn verify(&self, session: &Session, fingerprint_b64: &str) -> Result<VerifyResponse> {
        let url = format!("{}/verify", self.base_url);
        debug!(url = %url, "Polling verification state");

        let request = VerifyRequest {
            public_key_fingerprint: fingerprint_b64.to_string(),
            xsrf: session.xsrf.clone(),
        };

        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| ClientError::Parse(format!("verify response: {}", e)))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(ClientError::ServerError {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Request upload authorization; returns the archive folder token.
    pub async fn request_upload(
        &self,
        session: &Session,
        fingerprint_b64: &str,
    ) -> Result<UploadResponse> {
        let url = format!("{}/upload", self.base_url);
        debug!(url = %url, "Requesting upload authorization");

        let request = UploadRequest {
            public_key_fingerprint: fingerprint_b64.to_string(),
            xsrf: session.xsrf.clone(),
        };

        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| ClientError::Parse(format!("upload response: {}", e)))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(ClientError::ServerError {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_url() {
        assert!(matches!(
            CloudClient::new(""),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_rejects_bad_scheme() {
        assert!(matches!(
            CloudClient::new("ftp://example.com"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_normalizes_trailing_slash() {
        let client = CloudClient::new("https://skysync.cloud/").unwrap();
        assert_eq!(client.base_url(), "https://skysync.cloud");
    }
}
