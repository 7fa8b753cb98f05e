//! Create and edit versioned content
//!
//! Creating writes an item and its first real version in one atomic
//! request, linked through preliminary names before anything is sent.
//! Editing derives a new version from the current head and posts only that
//! version, refusing to fork the chain.

use crate::anonymize::AnonymizePolicy;
use crate::error::{Result, SdkError};
use crate::session::Session;
use crate::traits::VersionedContent;
use agora_client::sheets::Tags;
use agora_client::{PostOptions, Resource, ResourceClient, Sheets};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Item and version written by [`create_versioned`]
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub item: Resource,
    pub version: Resource,
}

/// Clone of `head` ready to be posted as its successor, with `edit` applied
/// to the copied sheets.
pub fn derive_version<F>(head: &Resource, edit: F) -> Result<Resource>
where
    F: FnOnce(&mut Sheets) -> agora_client::Result<()>,
{
    let mut data = head.data.clone();
    data.remove::<Tags>();
    edit(&mut data)?;

    Ok(Resource {
        path: String::new(),
        content_type: head.content_type.clone(),
        data,
        parent: head.parent.clone(),
        first_version_path: None,
    })
}

/// Create a new item below `pool` together with a version carrying
/// `content`.
pub async fn create_versioned<C>(
    client: &dyn ResourceClient,
    pool: &str,
    content: &C,
    options: PostOptions,
) -> Result<Created>
where
    C: VersionedContent + ?Sized,
{
    content.validate()?;

    let names = client.names();
    let item_name = names.next();
    let first_version = names.next();

    let item = Resource::new(content.item_type())
        .with_path(item_name.path())
        .with_parent(pool)
        .with_first_version_path(first_version.path());
    let mut version = Resource::new(content.version_type()).with_parent(item_name.path());
    version.set_follows(vec![first_version.path()])?;
    content.apply(&mut version.data)?;

    let mut created = client.deep_post(vec![item, version], options).await?;
    let (version, item) = match (created.pop(), created.pop()) {
        (Some(version), Some(item)) => (version, item),
        _ => {
            return Err(SdkError::InvalidState(
                "deep post returned fewer resources than sent".to_string(),
            ))
        }
    };

    info!(item = %item.path, version = %version.path, "created versioned content");
    Ok(Created { item, version })
}

/// Post a new version of `item_path` with `content` applied over the
/// current head.
pub async fn edit_versioned<C>(
    client: &dyn ResourceClient,
    item_path: &str,
    content: &C,
    options: PostOptions,
) -> Result<Resource>
where
    C: VersionedContent + ?Sized,
{
    content.validate()?;

    let head_path = client.get_newest_version_path_no_fork(item_path).await?;
    let head = client.get(&head_path).await?;
    let version = derive_version(&head, |sheets| content.apply(sheets))?;

    debug!(item = item_path, follows = %head_path, "posting edit");
    Ok(client
        .post_new_version_no_fork(&head_path, version, None, options)
        .await?)
}

/// Creates and edits content on behalf of the current user, applying the
/// anonymization policy of the target endpoint.
#[derive(Clone)]
pub struct ContentEditor {
    client: Arc<dyn ResourceClient>,
    anonymize: AnonymizePolicy,
    session: watch::Receiver<Session>,
}

impl ContentEditor {
    pub fn new(
        client: Arc<dyn ResourceClient>,
        anonymize: AnonymizePolicy,
        session: watch::Receiver<Session>,
    ) -> Self {
        Self {
            client,
            anonymize,
            session,
        }
    }

    async fn options_for(&self, path: &str, anonymize: Option<bool>) -> Result<PostOptions> {
        let user = self.session.borrow().user_path().map(str::to_string);
        let anonymize = self.anonymize.decide(path, anonymize, user.as_deref()).await?;
        Ok(PostOptions::anonymized(anonymize))
    }

    /// Create content below `pool`; `anonymize` overrides the user's default
    pub async fn create<C>(&self, pool: &str, content: &C, anonymize: Option<bool>) -> Result<Created>
    where
        C: VersionedContent + ?Sized,
    {
        let options = self.options_for(pool, anonymize).await?;
        create_versioned(self.client.as_ref(), pool, content, options).await
    }

    /// Edit the item at `item_path`; `anonymize` overrides the user's default
    pub async fn edit<C>(&self, item_path: &str, content: &C, anonymize: Option<bool>) -> Result<Resource>
    where
        C: VersionedContent + ?Sized,
    {
        let options = self.options_for(item_path, anonymize).await?;
        edit_versioned(self.client.as_ref(), item_path, content, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_client::sheets::{Title, Versionable};
    use agora_client::{ClientError, MemoryResourceClient};

    struct Doc(&'static str);

    impl VersionedContent for Doc {
        fn item_type(&self) -> &str {
            agora_client::content_types::PROPOSAL
        }

        fn version_type(&self) -> &str {
            agora_client::content_types::PROPOSAL_VERSION
        }

        fn apply(&self, sheets: &mut Sheets) -> agora_client::Result<()> {
            sheets.set(&Title {
                title: self.0.to_string(),
            })
        }

        fn validate(&self) -> Result<()> {
            if self.0.is_empty() {
                return Err(SdkError::Validation("title required".into()));
            }
            Ok(())
        }
    }

    fn store() -> MemoryResourceClient {
        MemoryResourceClient::new().with_resource(
            Resource::new(agora_client::content_types::POOL)
                .with_path("/docs/")
                .with_parent("/"),
        )
    }

    #[test]
    fn test_derive_keeps_foreign_sheets() {
        let head = Resource::new("v")
            .with_path("/docs/doc_0000000/VERSION_0000001/")
            .with_parent("/docs/doc_0000000/")
            .with_sheet(&Title { title: "old".into() })
            .unwrap()
            .with_sheet(&Versionable {
                follows: vec!["/docs/doc_0000000/VERSION_0000000/".into()],
            })
            .unwrap();

        let next = derive_version(&head, |sheets| sheets.set(&Title { title: "new".into() })).unwrap();
        assert!(next.path.is_empty());
        assert_eq!(next.parent.as_deref(), Some("/docs/doc_0000000/"));
        assert_eq!(next.data.require::<Title>().unwrap().title, "new");
        assert!(next.data.contains::<Versionable>());
    }

    #[tokio::test]
    async fn test_create_then_edit() {
        let client = store();

        let created = create_versioned(&client, "/docs/", &Doc("first"), PostOptions::default())
            .await
            .unwrap();
        assert_eq!(created.item.path, "/docs/proposal_0000000/");
        assert_eq!(created.version.path, "/docs/proposal_0000000/VERSION_0000001/");
        assert_eq!(client.calls().commit, 1);

        let edited = edit_versioned(&client, &created.item.path, &Doc("second"), PostOptions::default())
            .await
            .unwrap();
        assert_eq!(edited.follows().unwrap(), vec![created.version.path.clone()]);
        assert_eq!(edited.data.require::<Title>().unwrap().title, "second");
    }

    #[tokio::test]
    async fn test_validation_stops_before_network() {
        let client = store();
        let err = create_versioned(&client, "/docs/", &Doc(""), PostOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Validation(_)));
        assert_eq!(client.calls().commit, 0);
    }

    #[tokio::test]
    async fn test_edit_of_forked_item_refused() {
        let client = store();
        let created = create_versioned(&client, "/docs/", &Doc("first"), PostOptions::default())
            .await
            .unwrap();
        // branch off the first version directly, bypassing the no-fork check
        let mut branch = Resource::new(agora_client::content_types::PROPOSAL_VERSION);
        branch
            .set_follows(vec![created.item.first_version_path.clone().unwrap()])
            .unwrap();
        client
            .post(&created.item.path, branch, PostOptions::default())
            .await
            .unwrap();

        let err = edit_versioned(&client, &created.item.path, &Doc("x"), PostOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Client(ClientError::Fork { .. })));
    }
}
