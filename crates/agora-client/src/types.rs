//! Types for the resource client API

use crate::error::{ClientError, Result};
use crate::sheets::{Sheet, Versionable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API (paths are appended verbatim)
    pub base_url: String,
    /// Optional session token for authenticated requests
    pub api_token: Option<String>,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:6541".to_string(),
            api_token: None,
            timeout_secs: 30,
        }
    }
}

/// Content type discriminators known to the client
pub mod content_types {
    pub const RATE: &str = "agora.resources.rate.IRate";
    pub const RATE_VERSION: &str = "agora.resources.rate.IRateVersion";
    pub const COMMENT: &str = "agora.resources.comment.IComment";
    pub const COMMENT_VERSION: &str = "agora.resources.comment.ICommentVersion";
    pub const PROPOSAL: &str = "agora.resources.proposal.IProposal";
    pub const PROPOSAL_VERSION: &str = "agora.resources.proposal.IProposalVersion";
    pub const POOL: &str = "agora.resources.pool.IBasicPool";
    pub const PROCESS: &str = "agora.resources.process.IProcess";
    pub const USER: &str = "agora.resources.principal.IUser";
}

/// Open set of named, typed facets of a resource.
///
/// Values are kept as raw JSON so that facets this client does not know
/// about survive a read-modify-write cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sheets(BTreeMap<String, serde_json::Value>);

impl Sheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a typed sheet, `None` if the resource does not carry it
    pub fn get<S: Sheet>(&self) -> Result<Option<S>> {
        match self.0.get(S::NAME) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Read a typed sheet that must be present
    pub fn require<S: Sheet>(&self) -> Result<S> {
        self.get::<S>()?
            .ok_or_else(|| ClientError::InvalidResponse(format!("missing sheet {}", S::NAME)))
    }

    /// Write a typed sheet, replacing any previous value
    pub fn set<S: Sheet>(&mut self, sheet: &S) -> Result<()> {
        self.0.insert(S::NAME.to_string(), serde_json::to_value(sheet)?);
        Ok(())
    }

    pub fn contains<S: Sheet>(&self) -> bool {
        self.0.contains_key(S::NAME)
    }

    pub fn remove<S: Sheet>(&mut self) -> Option<serde_json::Value> {
        self.0.remove(S::NAME)
    }

    /// Raw access by sheet name
    pub fn raw(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// Find a sheet by its nick (see [`crate::sheets::sheet_nick`])
    pub fn by_nick(&self, nick: &str) -> Option<&serde_json::Value> {
        self.0
            .iter()
            .find(|(name, _)| crate::sheets::sheet_nick(name) == nick)
            .map(|(_, value)| value)
    }

    /// Iterate `(sheet name, payload)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (String, serde_json::Value)> {
        self.0.into_iter()
    }

    pub(crate) fn raw_mut(&mut self) -> &mut BTreeMap<String, serde_json::Value> {
        &mut self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An addressable, typed, versioned server-side entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Stable address (or a preliminary name before persistence)
    #[serde(default)]
    pub path: String,
    /// Content type discriminator
    pub content_type: String,
    /// Sheet data
    #[serde(default)]
    pub data: Sheets,
    /// Parent resource path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// First version path (items only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_version_path: Option<String>,
}

impl Resource {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_first_version_path(mut self, path: impl Into<String>) -> Self {
        self.first_version_path = Some(path.into());
        self
    }

    pub fn with_sheet<S: Sheet>(mut self, sheet: &S) -> Result<Self> {
        self.data.set(sheet)?;
        Ok(self)
    }

    /// Predecessor versions, empty for items and first versions
    pub fn follows(&self) -> Result<Vec<String>> {
        Ok(self
            .data
            .get::<Versionable>()?
            .map(|v| v.follows)
            .unwrap_or_default())
    }

    pub fn set_follows(&mut self, follows: Vec<String>) -> Result<()> {
        self.data.set(&Versionable { follows })
    }

    /// Whether the path is still a client-local placeholder
    pub fn is_preliminary(&self) -> bool {
        crate::preliminary::is_preliminary(&self.path)
    }
}

/// Parent of a slash-terminated resource path, `None` for the root
pub fn parent_path(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let (parent, _) = trimmed.rsplit_once('/')?;
    Some(format!("{}/", parent))
}

/// Query depth for pool listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Levels(u32),
    All,
}

impl Depth {
    pub fn as_param(&self) -> String {
        match self {
            Depth::Levels(n) => n.to_string(),
            Depth::All => "all".to_string(),
        }
    }

    /// Whether a resource `levels` below the pool is in range
    pub fn includes(&self, levels: usize) -> bool {
        match self {
            Depth::Levels(n) => levels <= *n as usize,
            Depth::All => true,
        }
    }
}

/// How pool elements are returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elements {
    /// Paths only
    Paths,
    /// Embedded resources
    Content,
    /// No element list (useful with `aggregateby` or `count`)
    Omit,
}

impl Elements {
    pub fn as_param(&self) -> &'static str {
        match self {
            Elements::Paths => "paths",
            Elements::Content => "content",
            Elements::Omit => "omit",
        }
    }
}

/// Query parameters for `GET` on a pool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub content_type: Option<String>,
    pub depth: Option<Depth>,
    pub tag: Option<String>,
    pub elements: Option<Elements>,
    pub aggregate_by: Option<String>,
    pub count: bool,
    /// Sheet field filters as (`<nick>:<field>`, value)
    pub filters: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_depth(mut self, depth: Depth) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_elements(mut self, elements: Elements) -> Self {
        self.elements = Some(elements);
        self
    }

    pub fn aggregate_by(mut self, field: impl Into<String>) -> Self {
        self.aggregate_by = Some(field.into());
        self
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }

    /// Filter on a field of a typed sheet
    pub fn filter<S: Sheet>(mut self, field: &str, value: impl Into<String>) -> Self {
        self.filters
            .push((format!("{}:{}", S::NICK, field), value.into()));
        self
    }

    /// Encode as URL query parameters
    pub fn to_params(&self) -> Vec<String> {
        let mut params = Vec::new();
        if let Some(ref ct) = self.content_type {
            params.push(format!("content_type={}", urlencoding::encode(ct)));
        }
        if let Some(depth) = self.depth {
            params.push(format!("depth={}", depth.as_param()));
        }
        if let Some(ref tag) = self.tag {
            params.push(format!("tag={}", urlencoding::encode(tag)));
        }
        if let Some(elements) = self.elements {
            params.push(format!("elements={}", elements.as_param()));
        }
        if let Some(ref field) = self.aggregate_by {
            params.push(format!("aggregateby={}", urlencoding::encode(field)));
        }
        if self.count {
            params.push("count=true".to_string());
        }
        for (key, value) in &self.filters {
            params.push(format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            ));
        }
        params
    }
}

/// Per-request options for writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostOptions {
    /// Send `X-Anonymize: true` so the server hides the creator
    pub anonymize: bool,
}

impl PostOptions {
    pub fn anonymized(anonymize: bool) -> Self {
        Self { anonymize }
    }
}

/// Header used to request anonymized writes
pub const ANONYMIZE_HEADER: &str = "X-Anonymize";

/// Header carrying the session token
pub const USER_TOKEN_HEADER: &str = "X-User-Token";

/// Result of an `OPTIONS` request: what the current user may do at a path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub get: bool,
    pub post: bool,
    pub put: bool,
    pub delete: bool,
    /// Extra request headers the endpoint accepts
    #[serde(default)]
    pub request_headers: Vec<String>,
}

impl Capabilities {
    /// Everything allowed, no extra headers
    pub fn all() -> Self {
        Self {
            get: true,
            post: true,
            put: true,
            delete: true,
            request_headers: Vec::new(),
        }
    }

    /// Read-only access
    pub fn read_only() -> Self {
        Self {
            get: true,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.request_headers.push(header.into());
        self
    }

    /// Parse an `OPTIONS` response body.
    ///
    /// The server lists one key per allowed method; request headers it
    /// accepts may be listed globally or under any method.
    pub fn from_options_body(body: &serde_json::Value) -> Self {
        let has = |method: &str| body.get(method).is_some();
        let mut request_headers: Vec<String> = Vec::new();
        let mut collect = |value: Option<&serde_json::Value>| {
            if let Some(list) = value.and_then(|v| v.as_array()) {
                for header in list.iter().filter_map(|h| h.as_str()) {
                    if !request_headers.iter().any(|h| h.eq_ignore_ascii_case(header)) {
                        request_headers.push(header.to_string());
                    }
                }
            }
        };
        collect(body.get("request_headers"));
        for method in ["GET", "POST", "PUT", "DELETE"] {
            collect(body.get(method).and_then(|m| m.get("request_headers")));
        }

        Self {
            get: has("GET"),
            post: has("POST"),
            put: has("PUT"),
            delete: has("DELETE"),
            request_headers,
        }
    }

    /// Whether the endpoint accepts the given request header
    pub fn supports_header(&self, header: &str) -> bool {
        self.request_headers
            .iter()
            .any(|h| h.eq_ignore_ascii_case(header))
    }
}

/// HTTP method of a batched request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BatchMethod {
    Get,
    Post,
    Put,
}

/// One request inside a batch transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub method: BatchMethod,
    /// Target path; may be or start with a preliminary name
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Resource>,
    /// Preliminary name the server binds to the created resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    /// Preliminary name the server binds to the created item's first version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_first_version_path: Option<String>,
}

/// One response of a batch transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub code: u16,
    pub body: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::Rate;

    #[test]
    fn test_parent_path() {
        assert_eq!(
            parent_path("/rates/rate_0000000/VERSION_0000001/").as_deref(),
            Some("/rates/rate_0000000/")
        );
        assert_eq!(parent_path("/rates/").as_deref(), Some("/"));
        assert_eq!(parent_path("/"), None);
    }

    #[test]
    fn test_query_params() {
        let params = Query::new()
            .with_content_type("agora.resources.rate.IRateVersion")
            .with_depth(Depth::All)
            .with_tag("LAST")
            .filter::<Rate>("object", "/proposals/42/")
            .to_params();

        assert!(params.contains(&"depth=all".to_string()));
        assert!(params.contains(&"tag=LAST".to_string()));
        assert!(params.contains(&"rate%3Aobject=%2Fproposals%2F42%2F".to_string()));
    }

    #[test]
    fn test_sheets_preserve_unknown() {
        let json = serde_json::json!({
            "path": "/p/",
            "content_type": "x",
            "data": {
                "agora.sheets.rate.IRate": {"subject": "/u/", "object": "/o/", "rate": 1},
                "vendor.sheets.IUnknown": {"anything": [1, 2, 3]}
            }
        });
        let mut resource: Resource = serde_json::from_value(json).unwrap();
        let mut rate: Rate = resource.data.require().unwrap();
        rate.rate = -1;
        resource.data.set(&rate).unwrap();

        let back = serde_json::to_value(&resource).unwrap();
        assert_eq!(back["data"]["vendor.sheets.IUnknown"]["anything"][2], 3);
        assert_eq!(back["data"]["agora.sheets.rate.IRate"]["rate"], -1);
    }

    #[test]
    fn test_capabilities_from_options() {
        let body = serde_json::json!({
            "GET": {},
            "POST": {"request_headers": ["X-Anonymize"]},
        });
        let caps = Capabilities::from_options_body(&body);
        assert!(caps.get);
        assert!(caps.post);
        assert!(!caps.put);
        assert!(caps.supports_header("x-anonymize"));
    }
}
