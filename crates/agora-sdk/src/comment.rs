//! Comments

use crate::error::{Result, SdkError};
use crate::traits::VersionedContent;
use agora_client::sheets::{Comment, Commentable};
use agora_client::{content_types, Resource, ResourceClient, Sheets};

/// Editable fields of a comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentForm {
    pub content: String,
    /// Path of the resource being commented on
    pub refers_to: String,
}

impl CommentForm {
    pub fn new(content: impl Into<String>, refers_to: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            refers_to: refers_to.into(),
        }
    }

    /// Prefill from an existing comment version
    pub fn from_version(version: &Resource) -> Result<Self> {
        let comment: Comment = version.data.require()?;
        Ok(Self {
            content: comment.content,
            refers_to: comment.refers_to,
        })
    }
}

impl VersionedContent for CommentForm {
    fn item_type(&self) -> &str {
        content_types::COMMENT
    }

    fn version_type(&self) -> &str {
        content_types::COMMENT_VERSION
    }

    fn apply(&self, sheets: &mut Sheets) -> agora_client::Result<()> {
        sheets.set(&Comment {
            content: self.content.clone(),
            refers_to: self.refers_to.clone(),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(SdkError::Validation("comment is empty".to_string()));
        }
        Ok(())
    }
}

/// Pool new comments on `object` are posted to
pub async fn comment_pool(client: &dyn ResourceClient, object: &str) -> Result<String> {
    let resource = client.get(object).await?;
    match resource.data.get::<Commentable>()? {
        Some(commentable) => Ok(commentable.post_pool),
        None => Err(SdkError::InvalidState(format!("{} is not commentable", object))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::{create_versioned, edit_versioned};
    use agora_client::{MemoryResourceClient, PostOptions};

    fn store() -> MemoryResourceClient {
        MemoryResourceClient::new()
            .with_resource(
                Resource::new(content_types::POOL)
                    .with_path("/proposals/")
                    .with_parent("/"),
            )
            .with_resource(
                Resource::new(content_types::POOL)
                    .with_path("/proposals/42/")
                    .with_parent("/proposals/")
                    .with_sheet(&Commentable {
                        post_pool: "/proposals/42/comments/".into(),
                    })
                    .unwrap(),
            )
            .with_resource(
                Resource::new(content_types::POOL)
                    .with_path("/proposals/42/comments/")
                    .with_parent("/proposals/42/"),
            )
    }

    #[tokio::test]
    async fn test_comment_round() {
        let client = store();
        let pool = comment_pool(&client, "/proposals/42/").await.unwrap();

        let created = create_versioned(
            &client,
            &pool,
            &CommentForm::new("I agree", "/proposals/42/"),
            PostOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(created.item.path, "/proposals/42/comments/comment_0000000/");

        let mut form = CommentForm::from_version(&created.version).unwrap();
        form.content = "I agree, with one change".into();
        let edited = edit_versioned(&client, &created.item.path, &form, PostOptions::default())
            .await
            .unwrap();

        let comment: Comment = edited.data.require().unwrap();
        assert_eq!(comment.refers_to, "/proposals/42/");
        assert_eq!(comment.content, "I agree, with one change");
    }

    #[tokio::test]
    async fn test_not_commentable() {
        let client = store();
        let err = comment_pool(&client, "/proposals/").await.unwrap_err();
        assert!(matches!(err, SdkError::InvalidState(_)));
    }
}
