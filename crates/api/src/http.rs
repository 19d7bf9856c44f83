use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use url::Url;

use drill_core::model::{AnswerOutcome, DifficultyTier, ItemId, ItemPage, ResourceId, SessionStats};

use crate::auth::TokenProvider;
use crate::error::ApiError;
use crate::source::{AnswerSubmitter, ItemSource, PageRequest, StatsProvider};

#[derive(Clone, Debug)]
pub struct HttpApiConfig {
    pub base_url: Url,
}

impl HttpApiConfig {
    /// Parse the REST base url, e.g. `https://example.com/api/v1`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidUrl` when `raw` is not an absolute url and
    /// `ApiError::NotABaseUrl` when it cannot carry a path (`mailto:` and the like).
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(raw.trim())?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::NotABaseUrl(base_url.into()));
        }
        Ok(Self { base_url })
    }
}

/// REST adapter for the item, answer and stats endpoints.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    config: HttpApiConfig,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpApi {
    #[must_use]
    pub fn new(config: HttpApiConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client: Client::new(),
            config,
            tokens,
        }
    }

    fn resource_url(&self, resource_id: &ResourceId, tail: &str) -> Result<Url, ApiError> {
        resource_url(&self.config.base_url, resource_id, tail)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.tokens.access_token().ok_or(ApiError::MissingToken)?;
        Ok(request.bearer_auth(token))
    }
}

/// Builds `{base}/resources/{id}/{tail}` with the id percent-encoded as one segment.
pub(crate) fn resource_url(
    base: &Url,
    resource_id: &ResourceId,
    tail: &str,
) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ApiError::NotABaseUrl(base.to_string()))?
        .pop_if_empty()
        .push("resources")
        .push(resource_id.as_str())
        .push(tail);
    Ok(url)
}

fn check_status(response: Response) -> Result<Response, ApiError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Unauthorized),
        StatusCode::NOT_FOUND => Err(ApiError::NotFound),
        status => Err(ApiError::HttpStatus(status)),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnswerBody<'a> {
    item_id: &'a ItemId,
    difficulty_tier: DifficultyTier,
}

#[async_trait]
impl ItemSource for HttpApi {
    async fn fetch_page(
        &self,
        resource_id: &ResourceId,
        request: &PageRequest,
    ) -> Result<ItemPage, ApiError> {
        let mut url = self.resource_url(resource_id, "items")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("page", &request.page.to_string())
                .append_pair("pageSize", &request.page_size.to_string());
            if let Some(group) = request.group {
                query.append_pair("group", &group.to_string());
            }
        }
        tracing::debug!(%resource_id, page = request.page, "fetching item page");

        let response = self.authorized(self.client.get(url))?.send().await?;
        let page: ItemPage = check_status(response)?.json().await?;
        Ok(page)
    }
}

#[async_trait]
impl AnswerSubmitter for HttpApi {
    async fn submit_answer(
        &self,
        resource_id: &ResourceId,
        item_id: &ItemId,
        tier: DifficultyTier,
    ) -> Result<AnswerOutcome, ApiError> {
        let url = self.resource_url(resource_id, "answers")?;
        let body = AnswerBody {
            item_id,
            difficulty_tier: tier,
        };
        let response = self
            .authorized(self.client.post(url))?
            .json(&body)
            .send()
            .await?;
        Ok(check_status(response)?.json().await?)
    }
}

#[async_trait]
impl StatsProvider for HttpApi {
    async fn session_stats(&self, resource_id: &ResourceId) -> Result<SessionStats, ApiError> {
        let url = self.resource_url(resource_id, "stats")?;
        let response = self.authorized(self.client.get(url))?.send().await?;
        Ok(check_status(response)?.json().await?)
    }
}
