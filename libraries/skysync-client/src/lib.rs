//! SkySync Cloud Client
//!
//! HTTP client library for the SkySync cloud service: session
//! establishment, account registration and verification, and upload
//! authorization. Also computes the SSH public-key fingerprint that
//! identifies an agent to the service.
//!
//! # Example
//!
//! ```ignore
//! use skysync_client::CloudClient;
//!
//! let client = CloudClient::new("https://skysync.cloud/")?;
//! let session = client.open_session().await?;
//! let auth = client.request_upload(&session, &fingerprint_b64).await?;
//! println!("upload into {}", auth.archive_folder);
//! ```

#![forbid(unsafe_code)]

mod client;
mod error;
mod fingerprint;
mod types;

// Re-export main types
pub use client::CloudClient;
pub use error::{ClientError, Result};
pub use fingerprint::{
    compute_fingerprint, fingerprint_b64, fingerprint_hex, public_key_b64, read_public_key,
};
pub use types::{
    RegisterResponse, Session, UploadResponse, VerifyResponse,
};
