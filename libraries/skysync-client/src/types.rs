//! Types for SkySync cloud API requests and responses.

use serde::{Deserialize, Serialize};

/// A live session with the cloud service.
///
/// The service issues an XSRF token as a cookie on first contact; every
/// mutating call must echo it back in the body. The cookie itself rides
/// along in the client's cookie store.
#[derive(Debug, Clone)]
pub struct Session {
    pub xsrf: String,
}

// =============================================================================
// Registration
// =============================================================================

/// Request body for the register endpoint.
#[derive(Debug, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    /// Base64 of the full public key line
    pub public_key: String,
    /// Base64 of the key fingerprint digest
    pub public_key_fingerprint: String,
    #[serde(rename = "_xsrf")]
    pub xsrf: String,
}

/// Response from a successful registration.
#[derive(Debug, Deserialize)]
pub struct RegisterResponse {
    pub msg: String,
}

// =============================================================================
// Verification
// =============================================================================

/// Request body for the verify endpoint.
#[derive(Debug, Serialize)]
pub struct VerifyRequest {
    pub public_key_fingerprint: String,
    #[serde(rename = "_xsrf")]
    pub xsrf: String,
}

/// Response from the verify endpoint.
///
/// `verify: false` is a normal outcome (the operator has not clicked the
/// confirmation link yet), not an error.
#[derive(Debug, Deserialize)]
pub struct VerifyResponse {
    pub verify: bool,
    pub msg: String,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

// =============================================================================
// Upload authorization
// =============================================================================

/// Request body for the upload endpoint.
#[derive(Debug, Serialize)]
pub struct UploadRequest {
    pub public_key_fingerprint: String,
    #[serde(rename = "_xsrf")]
    pub xsrf: String,
}

/// Upload authorization: the archive folder token assigned by the server.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub archive_folder: String,
}
