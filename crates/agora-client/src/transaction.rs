//! Batched transactions
//!
//! A [`Transaction`] queues `GET`/`POST`/`PUT` requests that the server runs
//! atomically in one round trip. Every queued call returns the index under
//! which its result appears in the committed [`TransactionResult`].

use crate::error::{ClientError, Result};
use crate::preliminary::{is_preliminary, Pending, PreliminaryNames};
use crate::types::{BatchMethod, BatchRequest, Resource};
use std::collections::HashMap;

/// Handles returned for a queued `POST`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posted {
    /// Index of the result in the committed transaction
    pub index: usize,
    /// Preliminary name of the created resource
    pub path: Pending,
    /// Preliminary name of the created item's first version
    pub first_version_path: Pending,
}

/// Builder for a batch of requests
#[derive(Debug, Clone)]
pub struct Transaction {
    names: PreliminaryNames,
    requests: Vec<BatchRequest>,
}

impl Transaction {
    pub fn new(names: PreliminaryNames) -> Self {
        Self {
            names,
            requests: Vec::new(),
        }
    }

    /// Queue a `GET`. `path` may be a preliminary name from an earlier `post`.
    pub fn get(&mut self, path: impl Into<String>) -> usize {
        self.push(BatchRequest {
            method: BatchMethod::Get,
            path: path.into(),
            body: None,
            result_path: None,
            result_first_version_path: None,
        })
    }

    /// Queue a `POST` creating `resource` below `parent`
    pub fn post(&mut self, parent: impl Into<String>, resource: Resource) -> Posted {
        let path = self.names.next();
        let first_version_path = self.names.next();
        let index = self.post_as(
            parent.into(),
            resource,
            Some(path.path()),
            Some(first_version_path.path()),
        );
        Posted {
            index,
            path,
            first_version_path,
        }
    }

    /// Queue a `PUT` replacing the sheets of `path`
    pub fn put(&mut self, path: impl Into<String>, resource: Resource) -> usize {
        self.push(BatchRequest {
            method: BatchMethod::Put,
            path: path.into(),
            body: Some(resource),
            result_path: None,
            result_first_version_path: None,
        })
    }

    pub(crate) fn post_as(
        &mut self,
        parent: String,
        mut body: Resource,
        result_path: Option<String>,
        result_first_version_path: Option<String>,
    ) -> usize {
        body.path = String::new();
        body.first_version_path = None;
        self.push(BatchRequest {
            method: BatchMethod::Post,
            path: parent,
            body: Some(body),
            result_path,
            result_first_version_path,
        })
    }

    fn push(&mut self, request: BatchRequest) -> usize {
        self.requests.push(request);
        self.requests.len() - 1
    }

    pub fn requests(&self) -> &[BatchRequest] {
        &self.requests
    }

    pub fn into_requests(self) -> Vec<BatchRequest> {
        self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Results of a committed transaction, positionally indexed
#[derive(Debug, Clone, Default)]
pub struct TransactionResult {
    responses: Vec<Resource>,
    resolution: HashMap<String, String>,
}

impl TransactionResult {
    /// Pair responses with the requests that produced them and record which
    /// preliminary names they resolved.
    pub fn from_responses(requests: &[BatchRequest], responses: Vec<Resource>) -> Result<Self> {
        if requests.len() != responses.len() {
            return Err(ClientError::InvalidResponse(format!(
                "batch returned {} results for {} requests",
                responses.len(),
                requests.len()
            )));
        }

        let mut resolution = HashMap::new();
        for (request, response) in requests.iter().zip(&responses) {
            if let Some(ref name) = request.result_path {
                resolution.insert(name.clone(), response.path.clone());
            }
            if let (Some(ref name), Some(ref real)) = (
                &request.result_first_version_path,
                &response.first_version_path,
            ) {
                resolution.insert(name.clone(), real.clone());
            }
        }

        Ok(Self {
            responses,
            resolution,
        })
    }

    /// Result of the request queued at `index`
    pub fn get(&self, index: usize) -> Result<&Resource> {
        self.responses.get(index).ok_or_else(|| {
            ClientError::InvalidResponse(format!("no transaction result at index {}", index))
        })
    }

    /// Real path a preliminary handle resolved to
    pub fn resolve(&self, pending: &Pending) -> Option<&str> {
        self.resolution.get(&pending.path()).map(String::as_str)
    }

    /// Replace a leading preliminary name in `path` with its real path
    pub fn resolve_path(&self, path: &str) -> String {
        resolve_with(&self.resolution, path)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    pub fn into_responses(self) -> Vec<Resource> {
        self.responses
    }
}

/// Substitute the longest known preliminary prefix of `path`
pub(crate) fn resolve_with(resolution: &HashMap<String, String>, path: &str) -> String {
    if !is_preliminary(path) {
        return path.to_string();
    }
    let name_end = path
        .find('/')
        .unwrap_or(path.len());
    let (name, rest) = path.split_at(name_end);
    match resolution.get(name) {
        Some(real) => {
            let rest = rest.trim_start_matches('/');
            format!("{}{}", real, rest)
        }
        None => path.to_string(),
    }
}

/// Order resources so that nothing is created before what its `parent` or
/// `follows` links point to. Returns indices into `resources`.
pub fn order_for_creation(resources: &[Resource]) -> Result<Vec<usize>> {
    let provides = |r: &Resource, link: &str| {
        r.path == link || r.first_version_path.as_deref() == Some(link)
    };

    let mut depends_on: Vec<Vec<usize>> = Vec::with_capacity(resources.len());
    for (i, resource) in resources.iter().enumerate() {
        let mut links: Vec<String> = resource.follows()?;
        links.extend(resource.parent.clone());
        let deps = links
            .iter()
            .filter(|link| is_preliminary(link))
            .filter_map(|link| {
                resources
                    .iter()
                    .enumerate()
                    .find(|(j, other)| *j != i && provides(*other, link.as_str()))
                    .map(|(j, _)| j)
            })
            .collect();
        depends_on.push(deps);
    }

    let mut placed = vec![false; resources.len()];
    let mut order = Vec::with_capacity(resources.len());
    while order.len() < resources.len() {
        let ready = (0..resources.len())
            .find(|&i| !placed[i] && depends_on[i].iter().all(|&d| placed[d]));
        match ready {
            Some(i) => {
                placed[i] = true;
                order.push(i);
            }
            None => {
                return Err(ClientError::InvalidRequest(
                    "cyclic preliminary references in deep post".to_string(),
                ))
            }
        }
    }
    Ok(order)
}

/// Build the batch for a deep post. Returns the transaction and, for each
/// input resource, the index of its result.
pub(crate) fn deep_post_transaction(
    names: PreliminaryNames,
    resources: &[Resource],
) -> Result<(Transaction, Vec<usize>)> {
    let order = order_for_creation(resources)?;
    let mut tx = Transaction::new(names);
    let mut result_index = vec![0; resources.len()];

    for i in order {
        let resource = &resources[i];
        let parent = resource.parent.clone().ok_or_else(|| {
            ClientError::InvalidRequest(format!(
                "resource {} has no parent to post to",
                resource.path
            ))
        })?;
        let result_path = is_preliminary(&resource.path).then(|| resource.path.clone());
        let result_first_version_path = resource
            .first_version_path
            .clone()
            .filter(|p| is_preliminary(p));
        result_index[i] = tx.post_as(
            parent,
            resource.clone(),
            result_path,
            result_first_version_path,
        );
    }

    Ok((tx, result_index))
}
