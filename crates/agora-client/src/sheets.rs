//! Typed sheets
//!
//! A sheet is a named facet of a resource's data. Each type here maps one
//! sheet name to a Rust payload; [`crate::Sheets`] stores them by name.

use crate::types::Resource;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

/// A statically typed sheet payload.
pub trait Sheet: Serialize + DeserializeOwned {
    /// Full sheet name as it appears on the wire
    const NAME: &'static str;
    /// Short name used in `"<nick>:<field>"` query filters
    const NICK: &'static str;
}

/// Derive the nick of a sheet name: last dotted segment, leading `I` removed,
/// lower-cased. `agora.sheets.rate.IRate` becomes `rate`.
pub fn sheet_nick(name: &str) -> String {
    let last = name.rsplit('.').next().unwrap_or(name);
    let stripped = match last.strip_prefix('I') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_uppercase()) => rest,
        _ => last,
    };
    stripped.to_lowercase()
}

macro_rules! sheet {
    ($ty:ty, $name:literal, $nick:literal) => {
        impl Sheet for $ty {
            const NAME: &'static str = $name;
            const NICK: &'static str = $nick;
        }
    };
}

/// Version chain link
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versionable {
    #[serde(default)]
    pub follows: Vec<String>,
}
sheet!(Versionable, "agora.sheets.versions.IVersionable", "versionable");

/// One user's rating of one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    /// User path
    pub subject: String,
    /// Rated resource path
    pub object: String,
    /// Conventionally -1, 0 or +1
    pub rate: i32,
}
sheet!(Rate, "agora.sheets.rate.IRate", "rate");

/// Marks a resource as rateable and names its rating pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rateable {
    pub post_pool: String,
}
sheet!(Rateable, "agora.sheets.rate.IRateable", "rateable");

/// Marks a resource as commentable and names its comment pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commentable {
    pub post_pool: String,
}
sheet!(Commentable, "agora.sheets.comment.ICommentable", "commentable");

/// Pool listing element: a path or an embedded resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PoolElement {
    Path(String),
    Content(Box<Resource>),
}

impl PoolElement {
    pub fn path(&self) -> &str {
        match self {
            PoolElement::Path(path) => path,
            PoolElement::Content(resource) => &resource.path,
        }
    }

    pub fn into_resource(self) -> Option<Resource> {
        match self {
            PoolElement::Path(_) => None,
            PoolElement::Content(resource) => Some(*resource),
        }
    }
}

/// Result sheet of a pool query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    #[serde(default)]
    pub elements: Vec<PoolElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// field → (stringified value → count)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aggregateby: BTreeMap<String, BTreeMap<String, u64>>,
}
sheet!(Pool, "agora.sheets.pool.IPool", "pool");

/// Version tags of an item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags {
    #[serde(rename = "FIRST", default, skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    /// Heads of the version chain; more than one means the chain forked
    #[serde(rename = "LAST", default)]
    pub last: Vec<String>,
}
sheet!(Tags, "agora.sheets.tags.ITags", "tags");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBasic {
    pub name: String,
}
sheet!(UserBasic, "agora.sheets.principal.IUserBasic", "userbasic");

/// Account-level anonymization preference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymizeDefault {
    #[serde(default)]
    pub anonymize: bool,
}
sheet!(
    AnonymizeDefault,
    "agora.sheets.principal.IAnonymizeDefault",
    "anonymizedefault"
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowAssignment {
    pub workflow_state: String,
}
sheet!(
    WorkflowAssignment,
    "agora.sheets.workflow.IWorkflowAssignment",
    "workflowassignment"
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub content: String,
    pub refers_to: String,
}
sheet!(Comment, "agora.sheets.comment.IComment", "comment");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    pub title: String,
}
sheet!(Title, "agora.sheets.title.ITitle", "title");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub description: String,
}
sheet!(Description, "agora.sheets.description.IDescription", "description");

/// Requested amount for participatory-budget proposals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub budget: u64,
}
sheet!(Budget, "agora.sheets.budget.IBudget", "budget");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nicks_match_names() {
        assert_eq!(sheet_nick(Rate::NAME), Rate::NICK);
        assert_eq!(sheet_nick(Versionable::NAME), Versionable::NICK);
        assert_eq!(sheet_nick(UserBasic::NAME), UserBasic::NICK);
        assert_eq!(sheet_nick(WorkflowAssignment::NAME), WorkflowAssignment::NICK);
        assert_eq!(sheet_nick(AnonymizeDefault::NAME), AnonymizeDefault::NICK);
        assert_eq!(sheet_nick(Description::NAME), Description::NICK);
        // not an interface prefix
        assert_eq!(sheet_nick("a.b.Image"), "image");
    }

    #[test]
    fn test_pool_element_untagged() {
        let pool: Pool = serde_json::from_value(serde_json::json!({
            "elements": [
                "/rates/rate_0000000/",
                {"path": "/rates/rate_0000001/VERSION_0000001/", "content_type": "x"}
            ]
        }))
        .unwrap();

        assert!(matches!(pool.elements[0], PoolElement::Path(_)));
        assert_eq!(pool.elements[1].path(), "/rates/rate_0000001/VERSION_0000001/");
    }
}
