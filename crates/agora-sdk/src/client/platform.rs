//! Platform: the object graph of one client session

use crate::anonymize::AnonymizePolicy;
use crate::config::AgoraConfig;
use crate::error::{Result, SdkError};
use crate::events::EventManager;
use crate::permissions::PermissionCache;
use crate::push::{PushChannel, WebSocketPush};
use crate::rate::{RateItemRegistry, RateService, RateWidget};
use crate::session::{MemoryNavigator, Navigator, Session};
use crate::versioning::ContentEditor;
use agora_client::sheets::Rateable;
use agora_client::{HttpResourceClient, ResourceClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shared components of one client session.
///
/// Cloning is cheap; clones share every component. Widgets and editors are
/// created from here so that they all use the same event registry,
/// permission cache and rate item registry.
///
/// # Example
///
/// ```rust,no_run
/// use agora_sdk::{AgoraConfig, Platform, Session};
///
/// # async fn example() -> agora_sdk::Result<()> {
/// let platform = Platform::connect(AgoraConfig::load("agora.toml")?)?;
/// platform.login(Session::authenticated("/principals/users/0000001/", "token"));
///
/// let widget = platform.rate_widget("/organisation/budget/proposal_0000003/", None).await?;
/// widget.cast(1).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Platform {
    config: Arc<AgoraConfig>,
    client: Arc<dyn ResourceClient>,
    events: EventManager,
    permissions: Arc<PermissionCache>,
    session: Arc<watch::Sender<Session>>,
    navigator: Arc<dyn Navigator>,
    push: Option<Arc<dyn PushChannel>>,
    registry: Arc<RateItemRegistry>,
}

impl Platform {
    /// Platform over an existing resource client, anonymous, without push
    pub fn new(config: AgoraConfig, client: Arc<dyn ResourceClient>) -> Self {
        let (session, _) = watch::channel(Session::anonymous());
        Self {
            config: Arc::new(config),
            permissions: Arc::new(PermissionCache::new(Arc::clone(&client))),
            client,
            events: EventManager::new(),
            session: Arc::new(session),
            navigator: Arc::new(MemoryNavigator::new("/")),
            push: None,
            registry: Arc::new(RateItemRegistry::new()),
        }
    }

    /// HTTP client and, if configured, websocket push from `config`.
    /// Must be called inside a tokio runtime when push is configured.
    pub fn connect(config: AgoraConfig) -> Result<Self> {
        let client = HttpResourceClient::new(config.client_config())
            .map_err(|e| SdkError::Config(e.to_string()))?;
        let push = config.websocket_url.as_ref().map(|url| {
            WebSocketPush::connect(url.clone(), Duration::from_secs(config.push_reconnect_secs))
        });

        info!(base_url = %config.base_url, push = push.is_some(), "connecting platform");
        let platform = Self::new(config, Arc::new(client));
        Ok(match push {
            Some(push) => platform.with_push(Arc::new(push)),
            None => platform,
        })
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn with_push(mut self, push: Arc<dyn PushChannel>) -> Self {
        self.push = Some(push);
        self
    }

    /// Switch to `session`. Its token replaces the client's credentials;
    /// permission snapshots and known rate items belonged to the previous
    /// user and are dropped. Mounted widgets re-fetch for the new user.
    pub fn login(&self, session: Session) {
        info!(user = ?session.user_path(), "login");
        if let Err(e) = self.client.set_token(session.token()) {
            warn!(error = %e, "session token rejected, sending requests without one");
        }
        self.session.send_replace(session);
        self.permissions.invalidate_all();
        self.registry.clear();
    }

    pub fn logout(&self) {
        self.login(Session::anonymous());
    }

    /// Current session
    pub fn session(&self) -> Session {
        self.session.borrow().clone()
    }

    /// Receiver that wakes on login and logout
    pub fn session_changes(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn config(&self) -> &AgoraConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn ResourceClient> {
        &self.client
    }

    pub fn events(&self) -> &EventManager {
        &self.events
    }

    pub fn permissions(&self) -> &Arc<PermissionCache> {
        &self.permissions
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn push(&self) -> Option<&Arc<dyn PushChannel>> {
        self.push.as_ref()
    }

    pub fn registry(&self) -> &Arc<RateItemRegistry> {
        &self.registry
    }

    pub fn rate_service(&self) -> RateService {
        RateService::new(Arc::clone(&self.client))
    }

    pub fn anonymize_policy(&self) -> AnonymizePolicy {
        AnonymizePolicy::new(
            Arc::clone(&self.client),
            Arc::clone(&self.permissions),
            self.config.anonymize_header.clone(),
        )
    }

    /// Editor for comments, proposals and other versioned content
    pub fn editor(&self) -> ContentEditor {
        ContentEditor::new(
            Arc::clone(&self.client),
            self.anonymize_policy(),
            self.session.subscribe(),
        )
    }

    /// Rating pool of a rateable resource
    pub async fn rate_pool_of(&self, object: &str) -> Result<String> {
        let resource = self.client.get(object).await?;
        match resource.data.get::<Rateable>()? {
            Some(rateable) => Ok(rateable.post_pool),
            None => Err(SdkError::InvalidState(format!("{} is not rateable", object))),
        }
    }

    /// Mount a rate widget for `object` in the pool its rateable sheet names
    pub async fn rate_widget(&self, object: &str, anonymize: Option<bool>) -> Result<RateWidget> {
        let pool = self.rate_pool_of(object).await?;
        RateWidget::mount(self, object, pool, anonymize).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_client::{content_types, Capabilities, MemoryResourceClient, Resource};

    #[tokio::test]
    async fn test_login_invalidates_permissions() {
        let memory = Arc::new(MemoryResourceClient::new());
        let platform = Platform::new(AgoraConfig::default(), memory.clone());

        platform.permissions().capabilities("/").await.unwrap();
        assert!(platform.permissions().cached("/").is_some());

        let mut changes = platform.session_changes();
        platform.login(Session::authenticated("/principals/users/0000001/", "t"));

        assert!(changes.has_changed().unwrap());
        assert!(platform.permissions().cached("/").is_none());
        assert!(platform.session().is_authenticated());
        assert_eq!(memory.token().as_deref(), Some("t"));

        platform.logout();
        assert!(!platform.session().is_authenticated());
        assert_eq!(memory.token(), None);
    }

    #[tokio::test]
    async fn test_rate_pool_from_rateable_sheet() {
        let memory = Arc::new(
            MemoryResourceClient::new()
                .with_resource(
                    Resource::new(content_types::POOL)
                        .with_path("/proposals/42/")
                        .with_sheet(&Rateable {
                            post_pool: "/rates/".into(),
                        })
                        .unwrap(),
                )
                .with_resource(Resource::new(content_types::POOL).with_path("/plain/"))
                .with_default_capabilities(Capabilities::all()),
        );
        let platform = Platform::new(AgoraConfig::default(), memory);

        assert_eq!(platform.rate_pool_of("/proposals/42/").await.unwrap(), "/rates/");
        assert!(matches!(
            platform.rate_pool_of("/plain/").await,
            Err(SdkError::InvalidState(_))
        ));
        assert!(platform.rate_pool_of("/missing/").await.unwrap_err().is_not_found());
    }
}
