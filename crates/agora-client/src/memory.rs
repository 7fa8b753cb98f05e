//! In-process resource store.
//!
//! Implements the whole [`ResourceClient`] contract without a server: items
//! get a first version on creation, pool queries understand depth, tags,
//! content type and sheet filters and `aggregateby`, batches are atomic and
//! resolve preliminary names, no-fork posts reject stale heads, and at most
//! one rate per (subject, object) may exist in a pool. Every operation counts
//! its calls so callers can assert on network traffic.

use crate::client::ResourceClient;
use crate::error::{ClientError, Result};
use crate::preliminary::{is_preliminary, PreliminaryNames};
use crate::sheets::{Pool, PoolElement, Rate, Tags, Versionable};
use crate::transaction::{resolve_with, Transaction, TransactionResult};
use crate::types::*;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::debug;

/// Snapshot of how often each operation was called
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get: u32,
    pub query: u32,
    pub post: u32,
    pub put: u32,
    pub options: u32,
    pub commit: u32,
    pub post_version: u32,
}

#[derive(Debug, Default)]
struct Calls {
    get: AtomicU32,
    query: AtomicU32,
    post: AtomicU32,
    put: AtomicU32,
    options: AtomicU32,
    commit: AtomicU32,
    post_version: AtomicU32,
}

impl Calls {
    fn snapshot(&self) -> CallCounts {
        CallCounts {
            get: self.get.load(Ordering::SeqCst),
            query: self.query.load(Ordering::SeqCst),
            post: self.post.load(Ordering::SeqCst),
            put: self.put.load(Ordering::SeqCst),
            options: self.options.load(Ordering::SeqCst),
            commit: self.commit.load(Ordering::SeqCst),
            post_version: self.post_version.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Store {
    resources: BTreeMap<String, Resource>,
    counters: HashMap<String, u64>,
    item_types: HashSet<String>,
    capabilities: HashMap<String, Capabilities>,
    default_capabilities: Capabilities,
}

fn segments(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

fn json_matches(value: &serde_json::Value, expected: &str) -> bool {
    match value {
        serde_json::Value::String(s) => s == expected,
        other => other.to_string() == expected,
    }
}

fn json_key(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn resolve_value(value: &mut serde_json::Value, resolution: &HashMap<String, String>) {
    match value {
        serde_json::Value::String(s) if is_preliminary(s) => *s = resolve_with(resolution, s),
        serde_json::Value::Array(items) => items
            .iter_mut()
            .for_each(|item| resolve_value(item, resolution)),
        serde_json::Value::Object(map) => map
            .values_mut()
            .for_each(|item| resolve_value(item, resolution)),
        _ => {}
    }
}

fn resolve_resource(resource: &mut Resource, resolution: &HashMap<String, String>) {
    if let Some(parent) = resource.parent.as_mut() {
        *parent = resolve_with(resolution, parent);
    }
    for value in resource.data.raw_mut().values_mut() {
        resolve_value(value, resolution);
    }
}

impl Store {
    fn is_item(&self, path: &str) -> bool {
        self.resources
            .get(path)
            .map(|r| r.first_version_path.is_some())
            .unwrap_or(false)
    }

    fn versions_of<'a>(&'a self, item: &'a str) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .values()
            .filter(move |r| r.parent.as_deref() == Some(item))
    }

    fn heads(&self, item: &str) -> Vec<String> {
        let followed: HashSet<String> = self
            .versions_of(item)
            .flat_map(|v| v.follows().unwrap_or_default())
            .collect();
        self.versions_of(item)
            .filter(|v| !followed.contains(&v.path))
            .map(|v| v.path.clone())
            .collect()
    }

    fn is_head(&self, path: &str) -> bool {
        match parent_path(path) {
            Some(item) if self.is_item(&item) => self.heads(&item).iter().any(|h| h == path),
            _ => false,
        }
    }

    fn decorate(&self, resource: &Resource) -> Result<Resource> {
        let mut resource = resource.clone();
        if let Some(ref first) = resource.first_version_path {
            let tags = Tags {
                first: Some(first.clone()),
                last: self.heads(&resource.path),
            };
            resource.data.set(&tags)?;
        }
        Ok(resource)
    }

    fn get(&self, path: &str) -> Result<Resource> {
        let resource = self
            .resources
            .get(path)
            .ok_or_else(|| ClientError::NotFound(path.to_string()))?;
        self.decorate(resource)
    }

    fn next_child_path(&mut self, parent: &str, name: &str) -> String {
        let key = format!("{}{}", parent, name);
        let counter = self.counters.entry(key).or_insert(0);
        let path = format!("{}{}_{:07}/", parent, name, counter);
        *counter += 1;
        path
    }

    fn create(&mut self, parent: &str, body: Resource, no_fork: bool) -> Result<Resource> {
        if !self.resources.contains_key(parent) {
            return Err(ClientError::NotFound(parent.to_string()));
        }
        if self.is_item(parent) {
            return self.create_version(parent, body, no_fork);
        }
        if self.item_types.contains(&body.content_type) {
            return self.create_item(parent, body);
        }

        let name = crate::sheets::sheet_nick(&body.content_type);
        let path = self.next_child_path(parent, &name);
        let resource = Resource {
            path: path.clone(),
            parent: Some(parent.to_string()),
            first_version_path: None,
            ..body
        };
        self.resources.insert(path.clone(), resource);
        self.get(&path)
    }

    fn create_item(&mut self, parent: &str, body: Resource) -> Result<Resource> {
        let name = crate::sheets::sheet_nick(&body.content_type);
        let path = self.next_child_path(parent, &name);
        let first_version_path = self.next_child_path(&path, "VERSION");

        let first_version = Resource::new(format!("{}Version", body.content_type))
            .with_path(first_version_path.clone())
            .with_parent(path.clone())
            .with_sheet(&Versionable::default())?;
        let item = Resource {
            path: path.clone(),
            parent: Some(parent.to_string()),
            first_version_path: Some(first_version_path.clone()),
            ..body
        };

        debug!(%path, "created item");
        self.resources.insert(path.clone(), item);
        self.resources.insert(first_version_path, first_version);
        self.get(&path)
    }

    fn create_version(&mut self, item: &str, body: Resource, no_fork: bool) -> Result<Resource> {
        let follows = body.follows()?;
        for predecessor in &follows {
            if parent_path(predecessor).as_deref() != Some(item)
                || !self.resources.contains_key(predecessor)
            {
                return Err(ClientError::Server {
                    status: 400,
                    message: format!("{} is not a version of {}", predecessor, item),
                });
            }
        }
        if no_fork {
            let mut heads = self.heads(item);
            let mut expected = follows.clone();
            heads.sort();
            expected.sort();
            if heads != expected {
                return Err(ClientError::Fork {
                    path: follows.first().cloned().unwrap_or_else(|| item.to_string()),
                });
            }
        }
        if let Some(rate) = body.data.get::<Rate>()? {
            self.check_rate_unique(item, &rate)?;
        }

        let path = self.next_child_path(item, "VERSION");
        let version = Resource {
            path: path.clone(),
            parent: Some(item.to_string()),
            first_version_path: None,
            ..body
        };
        self.resources.insert(path.clone(), version);
        self.get(&path)
    }

    fn check_rate_unique(&self, item: &str, rate: &Rate) -> Result<()> {
        let pool = parent_path(item);
        let taken = self.resources.values().any(|other| {
            let other_item = other.parent.as_deref().unwrap_or_default();
            other_item != item
                && parent_path(other_item) == pool
                && matches!(
                    other.data.get::<Rate>(),
                    Ok(Some(ref r)) if r.subject == rate.subject && r.object == rate.object
                )
        });
        if taken {
            return Err(ClientError::Conflict(format!(
                "Another rate by the same user already exists for {}",
                rate.object
            )));
        }
        Ok(())
    }

    fn update(&mut self, path: &str, body: Resource) -> Result<Resource> {
        let existing = self
            .resources
            .get_mut(path)
            .ok_or_else(|| ClientError::NotFound(path.to_string()))?;
        for (name, value) in body.data.into_entries() {
            existing.data.raw_mut().insert(name, value);
        }
        self.get(path)
    }

    fn query(&self, path: &str, query: &Query) -> Result<Resource> {
        let mut pool = self.get(path)?;
        let depth = query.depth.unwrap_or(Depth::Levels(1));
        let base = segments(path);

        let mut matched: Vec<&Resource> = self
            .resources
            .values()
            .filter(|r| r.path != path && r.path.starts_with(path))
            .filter(|r| depth.includes(segments(&r.path) - base))
            .filter(|r| {
                query
                    .content_type
                    .as_deref()
                    .map_or(true, |ct| r.content_type == ct)
            })
            .collect();

        match query.tag.as_deref() {
            Some("LAST") => matched.retain(|r| self.is_head(&r.path)),
            Some("FIRST") => matched.retain(|r| {
                parent_path(&r.path)
                    .and_then(|item| self.resources.get(&item))
                    .and_then(|item| item.first_version_path.as_deref())
                    == Some(r.path.as_str())
            }),
            _ => {}
        }

        for (key, expected) in &query.filters {
            let (nick, field) = key.split_once(':').ok_or_else(|| {
                ClientError::InvalidRequest(format!("filter {} is not <sheet>:<field>", key))
            })?;
            matched.retain(|r| {
                r.data
                    .by_nick(nick)
                    .and_then(|sheet| sheet.get(field))
                    .map_or(false, |value| json_matches(value, expected))
            });
        }

        let mut sheet = Pool::default();
        if let Some(ref field) = query.aggregate_by {
            let mut counts: BTreeMap<String, u64> = BTreeMap::new();
            for resource in &matched {
                let value = resource
                    .data
                    .iter()
                    .find_map(|(_, sheet)| sheet.get(field.as_str()));
                if let Some(value) = value {
                    *counts.entry(json_key(value)).or_insert(0) += 1;
                }
            }
            sheet.aggregateby.insert(field.clone(), counts);
        }
        if query.count {
            sheet.count = Some(matched.len() as u64);
        }
        sheet.elements = match query.elements.unwrap_or(Elements::Paths) {
            Elements::Paths => matched
                .iter()
                .map(|r| PoolElement::Path(r.path.clone()))
                .collect(),
            Elements::Content => matched
                .iter()
                .map(|r| Ok(PoolElement::Content(Box::new(self.decorate(r)?))))
                .collect::<Result<_>>()?,
            Elements::Omit => Vec::new(),
        };

        pool.data.set(&sheet)?;
        Ok(pool)
    }

    fn apply(
        &mut self,
        request: &crate::types::BatchRequest,
        resolution: &HashMap<String, String>,
    ) -> Result<Resource> {
        let path = resolve_with(resolution, &request.path);
        let body = request.body.clone().map(|mut body| {
            resolve_resource(&mut body, resolution);
            body
        });
        let missing_body =
            || ClientError::InvalidRequest(format!("{:?} {} needs a body", request.method, path));

        match request.method {
            BatchMethod::Get => self.get(&path),
            BatchMethod::Post => self.create(&path, body.ok_or_else(missing_body)?, false),
            BatchMethod::Put => self.update(&path, body.ok_or_else(missing_body)?),
        }
    }
}

/// In-memory [`ResourceClient`] for tests, demos and offline use
///
/// # Example
///
/// ```rust
/// use agora_client::{content_types, MemoryResourceClient, Resource, ResourceClient};
///
/// # async fn example() -> agora_client::Result<()> {
/// let client = MemoryResourceClient::new()
///     .with_resource(Resource::new(content_types::POOL).with_path("/rates/"));
///
/// let pool = client.get("/rates/").await?;
/// assert_eq!(client.calls().get, 1);
/// # Ok(())
/// # }
/// ```
pub struct MemoryResourceClient {
    names: PreliminaryNames,
    store: Mutex<Store>,
    calls: Calls,
    token: RwLock<Option<String>>,
}

impl MemoryResourceClient {
    /// Create an empty store containing only the root `/`
    pub fn new() -> Self {
        let mut store = Store {
            default_capabilities: Capabilities::all(),
            ..Default::default()
        };
        for item_type in [
            content_types::RATE,
            content_types::COMMENT,
            content_types::PROPOSAL,
        ] {
            store.item_types.insert(item_type.to_string());
        }
        store
            .resources
            .insert("/".to_string(), Resource::new(content_types::POOL).with_path("/"));

        Self {
            names: PreliminaryNames::new(),
            store: Mutex::new(store),
            calls: Calls::default(),
            token: RwLock::new(None),
        }
    }

    /// Seed a resource at its own path
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.store
            .get_mut()
            .resources
            .insert(resource.path.clone(), resource);
        self
    }

    /// Treat `content_type` as an item type (auto-created first version)
    pub fn with_item_type(mut self, content_type: impl Into<String>) -> Self {
        self.store.get_mut().item_types.insert(content_type.into());
        self
    }

    /// Capabilities returned by `OPTIONS` for `path`
    pub fn with_capabilities(mut self, path: impl Into<String>, capabilities: Capabilities) -> Self {
        self.store
            .get_mut()
            .capabilities
            .insert(path.into(), capabilities);
        self
    }

    /// Capabilities returned for paths without an explicit entry
    pub fn with_default_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.store.get_mut().default_capabilities = capabilities;
        self
    }

    /// Seed or replace a resource at runtime
    pub async fn insert(&self, resource: Resource) {
        let mut store = self.store.lock().await;
        store.resources.insert(resource.path.clone(), resource);
    }

    /// Change capabilities at runtime
    pub async fn set_capabilities(&self, path: impl Into<String>, capabilities: Capabilities) {
        let mut store = self.store.lock().await;
        store.capabilities.insert(path.into(), capabilities);
    }

    /// Every stored resource of the given content type
    pub async fn resources_of_type(&self, content_type: &str) -> Vec<Resource> {
        let store = self.store.lock().await;
        store
            .resources
            .values()
            .filter(|r| r.content_type == content_type)
            .cloned()
            .collect()
    }

    /// Token last handed over through [`ResourceClient::set_token`]
    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Call counts so far
    pub fn calls(&self) -> CallCounts {
        self.calls.snapshot()
    }
}

impl Default for MemoryResourceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceClient for MemoryResourceClient {
    fn names(&self) -> PreliminaryNames {
        self.names.clone()
    }

    fn set_token(&self, token: Option<&str>) -> Result<()> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token.map(str::to_string);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Resource> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.store.lock().await.get(path)
    }

    async fn query(&self, path: &str, query: &Query) -> Result<Resource> {
        self.calls.query.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.store.lock().await.query(path, query)
    }

    async fn post(&self, parent: &str, mut resource: Resource, _options: PostOptions) -> Result<Resource> {
        self.calls.post.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        resource.parent = Some(parent.to_string());
        self.store.lock().await.create(parent, resource, false)
    }

    async fn put(&self, path: &str, resource: Resource, _options: PostOptions) -> Result<Resource> {
        self.calls.put.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.store.lock().await.update(path, resource)
    }

    async fn options(&self, path: &str) -> Result<Capabilities> {
        self.calls.options.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let store = self.store.lock().await;
        Ok(store
            .capabilities
            .get(path)
            .cloned()
            .unwrap_or_else(|| store.default_capabilities.clone()))
    }

    async fn commit(&self, tx: Transaction, _options: PostOptions) -> Result<TransactionResult> {
        self.calls.commit.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let requests = tx.into_requests();

        let mut store = self.store.lock().await;
        let snapshot = store.clone();
        let mut resolution: HashMap<String, String> = HashMap::new();
        let mut results = Vec::with_capacity(requests.len());

        for request in &requests {
            let result = match store.apply(request, &resolution) {
                Ok(result) => result,
                Err(e) => {
                    *store = snapshot;
                    return Err(e);
                }
            };
            if let Some(ref name) = request.result_path {
                resolution.insert(name.clone(), result.path.clone());
            }
            if let (Some(ref name), Some(ref real)) =
                (&request.result_first_version_path, &result.first_version_path)
            {
                resolution.insert(name.clone(), real.clone());
            }
            results.push(result);
        }

        TransactionResult::from_responses(&requests, results)
    }

    async fn post_new_version_no_fork(
        &self,
        old_version_path: &str,
        mut version: Resource,
        follows_override: Option<Vec<String>>,
        _options: PostOptions,
    ) -> Result<Resource> {
        self.calls.post_version.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let item = parent_path(old_version_path).ok_or_else(|| {
            ClientError::InvalidRequest(format!("{} has no item", old_version_path))
        })?;
        version.parent = Some(item.clone());
        version.set_follows(follows_override.unwrap_or_else(|| vec![old_version_path.to_string()]))?;

        let mut store = self.store.lock().await;
        if !store.is_item(&item) {
            return Err(ClientError::NotFound(item));
        }
        match store.create_version(&item, version, true) {
            Err(ClientError::Fork { .. }) => Err(ClientError::Fork {
                path: old_version_path.to_string(),
            }),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::{Comment, Rate};

    fn rates_pool() -> MemoryResourceClient {
        MemoryResourceClient::new()
            .with_resource(Resource::new(content_types::POOL).with_path("/rates/").with_parent("/"))
    }

    fn rate(subject: &str, object: &str, value: i32) -> Resource {
        Resource::new(content_types::RATE_VERSION)
            .with_sheet(&Rate {
                subject: subject.into(),
                object: object.into(),
                rate: value,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_item_gets_first_version() {
        let client = rates_pool();
        let item = client
            .post("/rates/", Resource::new(content_types::RATE), PostOptions::default())
            .await
            .unwrap();

        assert_eq!(item.path, "/rates/rate_0000000/");
        assert_eq!(
            item.first_version_path.as_deref(),
            Some("/rates/rate_0000000/VERSION_0000000/")
        );
        let newest = client.get_newest_version_path_no_fork(&item.path).await.unwrap();
        assert_eq!(newest, "/rates/rate_0000000/VERSION_0000000/");
    }

    #[tokio::test]
    async fn test_no_fork_rejects_stale_head() {
        let client = rates_pool();
        let item = client
            .post("/rates/", Resource::new(content_types::RATE), PostOptions::default())
            .await
            .unwrap();
        let first = item.first_version_path.unwrap();

        let v1 = client
            .post_new_version_no_fork(&first, rate("/u/1/", "/p/1/", 1), None, PostOptions::default())
            .await
            .unwrap();
        assert_eq!(v1.follows().unwrap(), vec![first.clone()]);

        let stale = client
            .post_new_version_no_fork(&first, rate("/u/1/", "/p/1/", -1), None, PostOptions::default())
            .await;
        assert!(matches!(stale, Err(ClientError::Fork { .. })));
    }

    #[tokio::test]
    async fn test_rate_uniqueness() {
        let client = rates_pool();
        for _ in 0..2 {
            client
                .post("/rates/", Resource::new(content_types::RATE), PostOptions::default())
                .await
                .unwrap();
        }
        client
            .post_new_version_no_fork(
                "/rates/rate_0000000/VERSION_0000000/",
                rate("/u/1/", "/p/1/", 1),
                None,
                PostOptions::default(),
            )
            .await
            .unwrap();

        let second = client
            .post_new_version_no_fork(
                "/rates/rate_0000001/VERSION_0000000/",
                rate("/u/1/", "/p/1/", 1),
                None,
                PostOptions::default(),
            )
            .await;
        assert!(matches!(second, Err(ClientError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_query_last_filter_and_aggregate() {
        let client = rates_pool();
        for (user, value) in [("/u/1/", 1), ("/u/2/", 1), ("/u/3/", -1)] {
            let item = client
                .post("/rates/", Resource::new(content_types::RATE), PostOptions::default())
                .await
                .unwrap();
            client
                .post_new_version_no_fork(
                    &item.first_version_path.unwrap(),
                    rate(user, "/p/1/", value),
                    None,
                    PostOptions::default(),
                )
                .await
                .unwrap();
        }

        let query = Query::new()
            .with_content_type(content_types::RATE_VERSION)
            .with_depth(Depth::All)
            .with_tag("LAST")
            .filter::<Rate>("object", "/p/1/")
            .aggregate_by("rate")
            .with_count();
        let pool: Pool = client.query("/rates/", &query).await.unwrap().data.require().unwrap();

        assert_eq!(pool.count, Some(3));
        assert_eq!(pool.aggregateby["rate"]["1"], 2);
        assert_eq!(pool.aggregateby["rate"]["-1"], 1);

        let mine = Query::new()
            .with_depth(Depth::All)
            .with_tag("LAST")
            .with_elements(Elements::Content)
            .filter::<Rate>("object", "/p/1/")
            .filter::<Rate>("subject", "/u/3/");
        let pool: Pool = client.query("/rates/", &mine).await.unwrap().data.require().unwrap();
        assert_eq!(pool.elements.len(), 1);
        let resource = pool.elements[0].clone().into_resource().unwrap();
        assert_eq!(resource.data.require::<Rate>().unwrap().rate, -1);
    }

    #[tokio::test]
    async fn test_deep_post_resolves_and_rolls_back() {
        let client = MemoryResourceClient::new().with_resource(
            Resource::new(content_types::POOL)
                .with_path("/comments/")
                .with_parent("/"),
        );
        let names = client.names();
        let item = names.next();
        let first = names.next();

        let mut version = Resource::new(content_types::COMMENT_VERSION)
            .with_parent(item.path())
            .with_sheet(&Comment {
                content: "hello".into(),
                refers_to: "/p/1/".into(),
            })
            .unwrap();
        version.set_follows(vec![first.path()]).unwrap();
        let item_resource = Resource::new(content_types::COMMENT)
            .with_path(item.path())
            .with_parent("/comments/")
            .with_first_version_path(first.path());

        let created = client
            .deep_post(vec![version, item_resource], PostOptions::default())
            .await
            .unwrap();
        assert_eq!(created[1].path, "/comments/comment_0000000/");
        assert_eq!(
            created[0].follows().unwrap(),
            vec!["/comments/comment_0000000/VERSION_0000000/".to_string()]
        );

        // second request fails, first must not persist
        let mut tx = client.transaction();
        tx.post("/comments/", Resource::new(content_types::COMMENT));
        tx.get("/missing/");
        assert!(client.commit(tx, PostOptions::default()).await.is_err());
        assert_eq!(client.resources_of_type(content_types::COMMENT).await.len(), 1);
    }
}
