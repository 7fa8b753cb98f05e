//! Content traits for versioned write operations

use agora_client::Sheets;

/// A form whose fields become sheets of a versioned resource.
///
/// Implement this for each editable content type to create and edit it
/// through [`crate::versioning`].
///
/// # Example
///
/// ```rust
/// use agora_client::{sheets::Title, Sheets};
/// use agora_sdk::VersionedContent;
///
/// struct Headline {
///     title: String,
/// }
///
/// impl VersionedContent for Headline {
///     fn item_type(&self) -> &str { "agora.resources.document.IDocument" }
///     fn version_type(&self) -> &str { "agora.resources.document.IDocumentVersion" }
///
///     fn apply(&self, sheets: &mut Sheets) -> agora_client::Result<()> {
///         sheets.set(&Title { title: self.title.clone() })
///     }
/// }
/// ```
pub trait VersionedContent: Send + Sync {
    /// Content type of the item
    fn item_type(&self) -> &str;

    /// Content type of its versions
    fn version_type(&self) -> &str;

    /// Overlay the edited fields onto a version's sheets. Sheets the form
    /// does not own must be left alone.
    fn apply(&self, sheets: &mut Sheets) -> agora_client::Result<()>;

    /// Reject the form before any network call
    fn validate(&self) -> crate::error::Result<()> {
        Ok(())
    }
}
