use async_trait::async_trait;

use crate::{CompletionRequest, CompletionResponse};

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for logs.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a completion request and wait for the full response.
    ///
    /// Callers cancel by dropping the returned future; implementations must
    /// not rely on running to completion.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<CompletionResponse>;
}
