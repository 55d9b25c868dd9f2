use std::future::Future;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use quill_core::{AnalysisResult, Extraction, Setting};

use crate::router::LlmRouter;
use crate::{HelpKind, RewriteMode, ServiceError, TextService, extract_json_output, prompts};

#[derive(Debug, Deserialize)]
struct RewriteReply {
    #[serde(default)]
    variations: Vec<String>,
}

/// [`TextService`] backed by a chat model behind [`LlmRouter`].
#[derive(Debug, Clone)]
pub struct LlmTextService {
    router: LlmRouter,
}

impl LlmTextService {
    pub fn new(router: LlmRouter) -> Self {
        Self { router }
    }

    async fn complete(&self, prompt: String, cancel: &CancellationToken) -> Result<String, ServiceError> {
        debug!(
            provider = ?self.router.provider(),
            model = self.router.model(),
            prompt_chars = prompt.len(),
            "text service request"
        );
        cancellable(cancel, self.router.complete(&prompt)).await
    }
}

/// Race `fut` against `cancel`.  A token that is already cancelled never
/// starts the request.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    if cancel.is_cancelled() {
        return Err(ServiceError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ServiceError::Cancelled),
        result = fut => result,
    }
}

fn parse<T: serde::de::DeserializeOwned>(reply: &str, what: &str) -> Result<T, ServiceError> {
    extract_json_output(reply)
        .ok_or_else(|| ServiceError::Malformed(format!("{what}: no JSON object in reply")))
}

#[async_trait]
impl TextService for LlmTextService {
    async fn analyze(
        &self,
        text: &str,
        setting: Option<&Setting>,
        lore: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, ServiceError> {
        let reply = self
            .complete(prompts::analysis_prompt(text, setting, lore), cancel)
            .await?;
        parse(&reply, "analysis")
    }

    async fn rewrite(
        &self,
        text: &str,
        mode: RewriteMode,
        tone: Option<&str>,
        setting: Option<&Setting>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ServiceError> {
        let reply = self
            .complete(prompts::rewrite_prompt(text, mode, tone, setting), cancel)
            .await?;
        let parsed: RewriteReply = parse(&reply, "rewrite")?;
        let variations: Vec<String> = parsed
            .variations
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if variations.is_empty() {
            return Err(ServiceError::Malformed("rewrite: no variations".to_string()));
        }
        Ok(variations)
    }

    async fn explain_or_define(
        &self,
        text: &str,
        kind: HelpKind,
        cancel: &CancellationToken,
    ) -> Result<String, ServiceError> {
        let reply = self.complete(prompts::help_prompt(text, kind), cancel).await?;
        Ok(reply.trim().to_string())
    }

    async fn extract_entities(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Extraction, ServiceError> {
        let reply = self.complete(prompts::extraction_prompt(text), cancel).await?;
        parse(&reply, "extraction")
    }
}
