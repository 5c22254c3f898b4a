//! Scene locator signing.
//!
//! Remote workers fetch scene resources directly from blob storage, so the
//! locators handed out with a job may need to be exchanged for time-limited
//! signed URLs. The engine treats locators as opaque strings.

use async_trait::async_trait;

use crate::error::AppResult;

/// Turns a stored scene locator into one a worker can fetch.
#[async_trait]
pub trait SceneUrlSigner: Send + Sync {
    async fn sign(&self, locator: &str) -> AppResult<String>;
}

/// Hands locators out unchanged. Used when scene storage is public or
/// workers share the server's credentials.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughSigner;

#[async_trait]
impl SceneUrlSigner for PassthroughSigner {
    async fn sign(&self, locator: &str) -> AppResult<String> {
        Ok(locator.to_string())
    }
}
