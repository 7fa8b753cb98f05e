//! Agora SDK - rating and versioned content for participation clients
//!
//! Builds the client-side behaviour of the Agora participation platform on
//! top of [`agora_client`]:
//!
//! - **Rating**: [`RateWidget`] keeps a user's own rating and the aggregate
//!   counts of one object current, lazily creates the user's rate item and
//!   keeps every widget of the same object in sync through the
//!   [`EventManager`] and, across sessions, a [`PushChannel`].
//! - **Versioned content**: [`create_versioned`] / [`edit_versioned`] write
//!   comments, proposals and anything else implementing
//!   [`VersionedContent`] as append-only version chains.
//! - **Session plumbing**: permission snapshots, the anonymization policy,
//!   workflow lookup, login redirects and configuration.
//!
//! A [`Platform`] owns one instance of each shared component and is the
//! factory for widgets and editors.
//!
//! # Example
//!
//! ```rust,no_run
//! use agora_client::MemoryResourceClient;
//! use agora_sdk::{AgoraConfig, CommentForm, Platform, Session};
//! use std::sync::Arc;
//!
//! # async fn example() -> agora_sdk::Result<()> {
//! let platform = Platform::new(AgoraConfig::default(), Arc::new(MemoryResourceClient::new()));
//! platform.login(Session::authenticated("/principals/users/0000001/", "token"));
//!
//! // Rate a proposal
//! let widget = platform.rate_widget("/proposals/42/", None).await?;
//! widget.cast(1).await?;
//! assert!(widget.rates(1) >= 1);
//!
//! // Comment on it
//! let created = platform
//!     .editor()
//!     .create("/proposals/42/comments/", &CommentForm::new("Yes!", "/proposals/42/"), None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

// Core traits for content types
pub mod traits;

// Application root
pub mod client;

// Local event fan-out
pub mod events;

// Ratings
pub mod rate;

// Versioned content
pub mod comment;
pub mod proposal;
pub mod versioning;

// Session plumbing
pub mod anonymize;
pub mod lock;
pub mod permissions;
pub mod push;
pub mod session;
pub mod workflow;

pub mod config;
pub mod error;

// Re-export core traits
pub use traits::VersionedContent;

// Re-export platform types
pub use client::Platform;
pub use config::AgoraConfig;

// Re-export component types
pub use anonymize::{resolve_anonymize, AnonymizePolicy};
pub use comment::{comment_pool, CommentForm};
pub use events::{EventManager, Subscription};
pub use lock::{InFlight, InFlightGuard};
pub use permissions::PermissionCache;
pub use proposal::ProposalForm;
pub use push::{LoopbackPush, PushChannel, PushEvent, PushSubscription, WebSocketPush};
pub use rate::{
    AggregatedRates, AuditTrailEntry, CastOutcome, RateItemRegistry, RateService, RateState,
    RateWidget,
};
pub use session::{login_redirect, MemoryNavigator, Navigator, Session};
pub use versioning::{create_versioned, derive_version, edit_versioned, ContentEditor, Created};
pub use workflow::workflow_state;

// Re-export error types
pub use error::{Result, SdkError};

// Re-export the resource client
pub use agora_client;
