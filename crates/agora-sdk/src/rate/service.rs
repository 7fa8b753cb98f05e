//! Rating queries

use crate::error::{Result, SdkError};
use agora_client::sheets::{Pool, PoolElement, Rate, UserBasic};
use agora_client::{content_types, Depth, Elements, Query, Resource, ResourceClient};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Rate value → number of current ratings with that value
pub type AggregatedRates = BTreeMap<String, u64>;

/// One current rating of an object, with the rater's display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditTrailEntry {
    pub subject_name: String,
    pub rate: i32,
}

/// Stateless query façade for rating data.
///
/// Only the newest version of each rate item counts; older versions are
/// history.
#[derive(Clone)]
pub struct RateService {
    client: Arc<dyn ResourceClient>,
}

impl RateService {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }

    fn current_rates(object: &str) -> Query {
        Query::new()
            .with_content_type(content_types::RATE_VERSION)
            .with_depth(Depth::All)
            .with_tag("LAST")
            .filter::<Rate>("object", object)
    }

    async fn resource_of(&self, element: PoolElement) -> Result<Resource> {
        match element {
            PoolElement::Content(resource) => Ok(*resource),
            PoolElement::Path(path) => Ok(self.client.get(&path).await?),
        }
    }

    /// Newest rate version by `subject` on `object`.
    ///
    /// Fails with [`SdkError::NotFound`] if the subject has not rated the
    /// object. At most one match exists; the first one is returned.
    pub async fn fetch_rate(&self, pool: &str, object: &str, subject: &str) -> Result<Resource> {
        let query = Self::current_rates(object)
            .filter::<Rate>("subject", subject)
            .with_elements(Elements::Content);
        let listing: Pool = self.client.query(pool, &query).await?.data.require()?;

        match listing.elements.into_iter().next() {
            Some(element) => self.resource_of(element).await,
            None => {
                debug!(pool, object, subject, "no rating yet");
                Err(SdkError::NotFound)
            }
        }
    }

    /// Counts of current ratings of `object` per rate value
    pub async fn fetch_aggregated_rates(&self, pool: &str, object: &str) -> Result<AggregatedRates> {
        let query = Self::current_rates(object)
            .with_elements(Elements::Omit)
            .aggregate_by("rate");
        let listing: Pool = self.client.query(pool, &query).await?.data.require()?;
        Ok(listing.aggregateby.get("rate").cloned().unwrap_or_default())
    }

    /// Every current rating of `object` with the rater's name
    pub async fn fetch_audit_trail(&self, pool: &str, object: &str) -> Result<Vec<AuditTrailEntry>> {
        let query = Self::current_rates(object).with_elements(Elements::Content);
        let listing: Pool = self.client.query(pool, &query).await?.data.require()?;

        let mut names: HashMap<String, String> = HashMap::new();
        let mut trail = Vec::with_capacity(listing.elements.len());
        for element in listing.elements {
            let version = self.resource_of(element).await?;
            let Some(rate) = version.data.get::<Rate>()? else {
                continue;
            };
            let subject_name = match names.get(&rate.subject) {
                Some(name) => name.clone(),
                None => {
                    let name = self.display_name(&rate.subject).await?;
                    names.insert(rate.subject.clone(), name.clone());
                    name
                }
            };
            trail.push(AuditTrailEntry {
                subject_name,
                rate: rate.rate,
            });
        }
        Ok(trail)
    }

    async fn display_name(&self, user_path: &str) -> Result<String> {
        match self.client.get(user_path).await {
            Ok(user) => Ok(user
                .data
                .get::<UserBasic>()?
                .map(|basic| basic.name)
                .unwrap_or_else(|| user_path.to_string())),
            // anonymized or deleted users
            Err(e) if e.is_not_found() => Ok(user_path.to_string()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_client::{MemoryResourceClient, PostOptions};

    async fn rated(client: &MemoryResourceClient, ratings: &[(&str, i32)]) {
        for (user, value) in ratings {
            let item = client
                .post("/rates/", Resource::new(content_types::RATE), PostOptions::default())
                .await
                .unwrap();
            let version = Resource::new(content_types::RATE_VERSION)
                .with_sheet(&Rate {
                    subject: user.to_string(),
                    object: "/proposals/42/".into(),
                    rate: *value,
                })
                .unwrap();
            client
                .post_new_version_no_fork(
                    &item.first_version_path.unwrap(),
                    version,
                    None,
                    PostOptions::default(),
                )
                .await
                .unwrap();
        }
    }

    fn store() -> Arc<MemoryResourceClient> {
        Arc::new(
            MemoryResourceClient::new()
                .with_resource(
                    Resource::new(content_types::POOL)
                        .with_path("/rates/")
                        .with_parent("/"),
                )
                .with_resource(
                    Resource::new(content_types::USER)
                        .with_path("/principals/users/0000001/")
                        .with_sheet(&UserBasic { name: "Alex".into() })
                        .unwrap(),
                ),
        )
    }

    #[tokio::test]
    async fn test_fetch_rate_not_found() {
        let client = store();
        let service = RateService::new(client.clone());

        let err = service
            .fetch_rate("/rates/", "/proposals/42/", "/principals/users/0000001/")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Not Found");
    }

    #[tokio::test]
    async fn test_fetch_rate_and_aggregates_use_newest_versions() {
        let client = store();
        rated(&client, &[("/principals/users/0000001/", 1), ("/principals/users/0000002/", -1)]).await;
        // user 1 changes their mind
        let head = client
            .get_newest_version_path_no_fork("/rates/rate_0000000/")
            .await
            .unwrap();
        let version = Resource::new(content_types::RATE_VERSION)
            .with_sheet(&Rate {
                subject: "/principals/users/0000001/".into(),
                object: "/proposals/42/".into(),
                rate: -1,
            })
            .unwrap();
        client
            .post_new_version_no_fork(&head, version, None, PostOptions::default())
            .await
            .unwrap();

        let service = RateService::new(client.clone());
        let own = service
            .fetch_rate("/rates/", "/proposals/42/", "/principals/users/0000001/")
            .await
            .unwrap();
        assert_eq!(own.data.require::<Rate>().unwrap().rate, -1);

        let aggregates = service
            .fetch_aggregated_rates("/rates/", "/proposals/42/")
            .await
            .unwrap();
        assert_eq!(aggregates.get("-1"), Some(&2));
        assert_eq!(aggregates.get("1"), None);
    }

    #[tokio::test]
    async fn test_audit_trail_names() {
        let client = store();
        rated(&client, &[("/principals/users/0000001/", 1), ("/principals/users/0000009/", 0)]).await;

        let mut trail = RateService::new(client.clone())
            .fetch_audit_trail("/rates/", "/proposals/42/")
            .await
            .unwrap();
        trail.sort_by(|a, b| a.subject_name.cmp(&b.subject_name));

        assert_eq!(
            trail,
            vec![
                AuditTrailEntry {
                    subject_name: "/principals/users/0000009/".into(),
                    rate: 0
                },
                AuditTrailEntry {
                    subject_name: "Alex".into(),
                    rate: 1
                },
            ]
        );
    }
}
