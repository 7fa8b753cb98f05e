//! Rust client for the Agora versioned resource API
//!
//! Resources are addressed by slash-terminated paths, carry their data as a
//! set of named sheets, and are versioned as items holding append-only
//! chains of immutable versions.
//!
//! # Example
//!
//! ```rust,no_run
//! use agora_client::{
//!     content_types, sheets::Rate, ClientConfig, Depth, HttpResourceClient, PostOptions, Query,
//!     Resource, ResourceClient,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpResourceClient::new(ClientConfig {
//!     base_url: "http://localhost:6541".into(),
//!     ..Default::default()
//! })?;
//!
//! // Create a rate item and read back its first version in one round trip
//! let mut tx = client.transaction();
//! let posted = tx.post("/rates/", Resource::new(content_types::RATE));
//! let first = tx.get(posted.first_version_path.path());
//! let result = client.commit(tx, PostOptions::default()).await?;
//! let first_version = result.get(first)?.clone();
//!
//! // Derive the next version
//! let version = first_version.clone().with_sheet(&Rate {
//!     subject: "/principals/users/0000001/".into(),
//!     object: "/proposals/42/".into(),
//!     rate: 1,
//! })?;
//! client
//!     .post_new_version_no_fork(&first_version.path, version, None, PostOptions::default())
//!     .await?;
//!
//! // Count ratings by value
//! let query = Query::new()
//!     .with_content_type(content_types::RATE_VERSION)
//!     .with_depth(Depth::All)
//!     .with_tag("LAST")
//!     .filter::<Rate>("object", "/proposals/42/")
//!     .aggregate_by("rate");
//! let pool = client.query("/rates/", &query).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod memory;
pub mod preliminary;
pub mod sheets;
pub mod transaction;
pub mod types;

// Re-export main types
pub use client::{HttpResourceClient, ResourceClient};
pub use error::{ClientError, Result};
pub use memory::{CallCounts, MemoryResourceClient};
pub use preliminary::{is_preliminary, Pending, PreliminaryNames};
pub use sheets::Sheet;
pub use transaction::{order_for_creation, Posted, Transaction, TransactionResult};
pub use types::*;
