//! Resource client contract and its HTTP implementation

use crate::error::{ClientError, Result};
use crate::preliminary::PreliminaryNames;
use crate::sheets::Tags;
use crate::transaction::{deep_post_transaction, Transaction, TransactionResult};
use crate::types::*;
use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

/// Typed CRUD and batched transactions against the versioned resource store.
///
/// Implemented over HTTP by [`HttpResourceClient`] and in-process by
/// [`crate::MemoryResourceClient`].
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Preliminary name generator shared by every transaction of this session
    fn names(&self) -> PreliminaryNames;

    /// Start a transaction bound to this session's preliminary names
    fn transaction(&self) -> Transaction {
        Transaction::new(self.names())
    }

    /// Use `token` for every following request; `None` sends requests
    /// without credentials
    fn set_token(&self, _token: Option<&str>) -> Result<()> {
        Ok(())
    }

    /// Fetch a single resource
    async fn get(&self, path: &str) -> Result<Resource>;

    /// Query a pool; the listing comes back in the pool sheet
    async fn query(&self, path: &str, query: &Query) -> Result<Resource>;

    /// Create `resource` below `parent`
    async fn post(&self, parent: &str, resource: Resource, options: PostOptions) -> Result<Resource>;

    /// Replace the sheets of an existing resource
    async fn put(&self, path: &str, resource: Resource, options: PostOptions) -> Result<Resource>;

    /// What the current user may do at `path`
    async fn options(&self, path: &str) -> Result<Capabilities>;

    /// Run every queued request of `tx` in one round trip, atomically
    async fn commit(&self, tx: Transaction, options: PostOptions) -> Result<TransactionResult>;

    /// Post a version that must follow the current head of its item.
    ///
    /// `follows` is set to `follows_override` or `[old_version_path]`; the
    /// server answers [`ClientError::Fork`] if the head has moved on.
    async fn post_new_version_no_fork(
        &self,
        old_version_path: &str,
        version: Resource,
        follows_override: Option<Vec<String>>,
        options: PostOptions,
    ) -> Result<Resource>;

    /// Path of the single head version of `item_path`; [`ClientError::Fork`]
    /// if the chain has more than one head.
    async fn get_newest_version_path_no_fork(&self, item_path: &str) -> Result<String> {
        let item = self.get(item_path).await?;
        let tags: Tags = item.data.require()?;
        match tags.last.as_slice() {
            [head] => Ok(head.clone()),
            [] => Err(ClientError::InvalidResponse(format!(
                "item {} has no versions",
                item_path
            ))),
            _ => Err(ClientError::Fork {
                path: item_path.to_string(),
            }),
        }
    }

    /// Create several linked resources in one atomic request.
    ///
    /// Resources may point at each other through preliminary names; they are
    /// sent in dependency order and the results come back in input order.
    async fn deep_post(&self, resources: Vec<Resource>, options: PostOptions) -> Result<Vec<Resource>> {
        let (tx, result_index) = deep_post_transaction(self.names(), &resources)?;
        let result = self.commit(tx, options).await?;
        result_index
            .into_iter()
            .map(|index| result.get(index).cloned())
            .collect()
    }
}

/// HTTP client for the resource API
///
/// # Example
///
/// ```rust,no_run
/// use agora_client::{ClientConfig, HttpResourceClient, Query, ResourceClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpResourceClient::new(ClientConfig {
///     base_url: "http://localhost:6541".into(),
///     ..Default::default()
/// })?;
///
/// let proposal = client.get("/organisation/process/proposal_0000003/").await?;
/// let pool = client.query("/rates/", &Query::new().with_tag("LAST")).await?;
/// # Ok(())
/// # }
/// ```
pub struct HttpResourceClient {
    config: ClientConfig,
    client: Client,
    names: PreliminaryNames,
    token: RwLock<Option<header::HeaderValue>>,
}

fn token_header(token: &str) -> Result<header::HeaderValue> {
    let mut value = header::HeaderValue::from_str(token).map_err(|_| {
        ClientError::InvalidRequest("token is not a valid header value".to_string())
    })?;
    value.set_sensitive(true);
    Ok(value)
}

impl HttpResourceClient {
    /// Create a new HTTP resource client
    pub fn new(config: ClientConfig) -> Result<Self> {
        let token = config.api_token.as_deref().map(token_header).transpose()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            client,
            names: PreliminaryNames::new(),
            token: RwLock::new(token),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Attach the current session token
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match token {
            Some(token) => request.header(USER_TOKEN_HEADER, token),
            None => request,
        }
    }

    fn request(&self, method: Method, path: &str, options: PostOptions) -> RequestBuilder {
        let mut request = self.authorized(self.client.request(method, self.url(path)));
        if options.anonymize {
            request = request.header(ANONYMIZE_HEADER, "true");
        }
        request
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status.as_u16(), path, body));
        }

        let body = response.json().await?;
        Ok(body)
    }
}

#[async_trait]
impl ResourceClient for HttpResourceClient {
    fn names(&self) -> PreliminaryNames {
        self.names.clone()
    }

    fn set_token(&self, token: Option<&str>) -> Result<()> {
        let value = token.map(token_header).transpose();
        let mut current = self.token.write().unwrap_or_else(PoisonError::into_inner);
        match value {
            Ok(value) => {
                *current = value;
                Ok(())
            }
            Err(e) => {
                *current = None;
                Err(e)
            }
        }
    }

    async fn get(&self, path: &str) -> Result<Resource> {
        let response = self
            .request(Method::GET, path, PostOptions::default())
            .send()
            .await?;
        self.handle_response(path, response).await
    }

    async fn query(&self, path: &str, query: &Query) -> Result<Resource> {
        let mut url = self.url(path);
        let params = query.to_params();
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }

        debug!(path, ?query, "querying pool");
        let response = self.authorized(self.client.get(&url)).send().await?;
        self.handle_response(path, response).await
    }

    async fn post(&self, parent: &str, resource: Resource, options: PostOptions) -> Result<Resource> {
        let response = self
            .request(Method::POST, parent, options)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&resource)
            .send()
            .await?;

        self.handle_response(parent, response).await
    }

    async fn put(&self, path: &str, resource: Resource, options: PostOptions) -> Result<Resource> {
        let response = self
            .request(Method::PUT, path, options)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&resource)
            .send()
            .await?;

        self.handle_response(path, response).await
    }

    async fn options(&self, path: &str) -> Result<Capabilities> {
        let response = self
            .request(Method::OPTIONS, path, PostOptions::default())
            .send()
            .await?;
        let body: serde_json::Value = self.handle_response(path, response).await?;
        Ok(Capabilities::from_options_body(&body))
    }

    async fn commit(&self, tx: Transaction, options: PostOptions) -> Result<TransactionResult> {
        if tx.is_empty() {
            return Ok(TransactionResult::default());
        }
        let requests = tx.into_requests();

        debug!(requests = requests.len(), "committing batch");
        let response = self
            .request(Method::POST, "/batch", options)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&requests)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status.as_u16(), "/batch", body));
        }

        let responses: Vec<BatchResponse> = response.json().await?;
        let mut resources = Vec::with_capacity(responses.len());
        for (request, item) in requests.iter().zip(responses) {
            if item.code >= 400 {
                return Err(ClientError::from_status(
                    item.code,
                    &request.path,
                    item.body.to_string(),
                ));
            }
            resources.push(serde_json::from_value(item.body)?);
        }

        TransactionResult::from_responses(&requests, resources)
    }

    async fn post_new_version_no_fork(
        &self,
        old_version_path: &str,
        mut version: Resource,
        follows_override: Option<Vec<String>>,
        options: PostOptions,
    ) -> Result<Resource> {
        let item_path = parent_path(old_version_path).ok_or_else(|| {
            ClientError::InvalidRequest(format!("{} has no item", old_version_path))
        })?;
        version.path = String::new();
        version.parent = Some(item_path.clone());
        version.set_follows(follows_override.unwrap_or_else(|| vec![old_version_path.to_string()]))?;

        match self.post(&item_path, version, options).await {
            Err(ClientError::Fork { .. }) => Err(ClientError::Fork {
                path: old_version_path.to_string(),
            }),
            other => other,
        }
    }
}
