use async_trait::async_trait;

use crate::Result;

/// Text embedding provider
#[async_trait]
pub trait Embedder: Send + Sync + 'static {
    /// Embed one piece of text. Network failures map to `ProviderUnavailable`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn model_name(&self) -> &str;

    async fn is_available(&self) -> bool {
        true
    }
}
