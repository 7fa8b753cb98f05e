//! Rate widget state machine
//!
//! One widget is bound to one rated object (`refers_to`). After mounting it
//! holds the user's own rating and the aggregate counts. Casting a rating
//! lazily creates the user's rate item, posts a new version of it, tells
//! sibling widgets of the same object to re-fetch, and re-fetches itself.

use crate::client::Platform;
use crate::error::{Result, SdkError};
use crate::events::Subscription;
use crate::lock::InFlight;
use crate::rate::service::{AggregatedRates, AuditTrailEntry, RateService};
use crate::session::{login_redirect, Session};
use crate::versioning::derive_version;
use crate::workflow::workflow_state;
use agora_client::sheets::Rate;
use agora_client::{content_types, parent_path, ClientError, PostOptions, Resource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What a cast did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOutcome {
    /// The rating was stored
    Cast(i32),
    /// The user is not logged in and was sent to the login page
    LoginRequired,
    /// The user is logged in but may not rate here
    NotPermitted,
}

/// Last fetched data of a widget
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateState {
    /// The user's current rate version, if they have rated
    pub own: Option<Resource>,
    pub aggregates: AggregatedRates,
    /// Workflow state of the governing process, looked up once on mount
    pub workflow_state: Option<String>,
    /// Results revealed by hand
    pub show_result_manual: bool,
    /// Initial fetch completed
    pub ready: bool,
}

impl RateState {
    pub fn own_rate(&self) -> Option<i32> {
        self.own
            .as_ref()
            .and_then(|own| own.data.get::<Rate>().ok().flatten())
            .map(|rate| rate.rate)
    }
}

/// Where the next version goes
struct RateTarget {
    item: String,
    /// Head version, when it is known without asking the server
    head: Option<Resource>,
}

fn item_of(version: &Resource) -> Result<String> {
    version
        .parent
        .clone()
        .or_else(|| parent_path(&version.path))
        .ok_or_else(|| SdkError::InvalidState(format!("{} has no item", version.path)))
}

struct Inner {
    platform: Platform,
    service: RateService,
    refers_to: String,
    pool: String,
    anonymize: Option<bool>,
    state: watch::Sender<RateState>,
    lock: InFlight,
    notify: mpsc::UnboundedSender<()>,
    subscription: Subscription,
    push_subscribed: AtomicBool,
    push_task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let task = self
            .push_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl Inner {
    async fn refresh(&self) -> Result<()> {
        let subject = self.platform.session().user_path().map(str::to_string);

        let own = match subject.as_deref() {
            Some(subject) => match self
                .service
                .fetch_rate(&self.pool, &self.refers_to, subject)
                .await
            {
                Ok(own) => Some(own),
                Err(SdkError::NotFound) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };
        let aggregates = self
            .service
            .fetch_aggregated_rates(&self.pool, &self.refers_to)
            .await?;

        if let (Some(subject), Some(own)) = (subject.as_deref(), own.as_ref()) {
            let item = item_of(own)?;
            self.platform
                .registry()
                .remember(subject, &self.refers_to, &item);
            self.watch_item(&item).await;
        }

        self.state.send_modify(|state| {
            state.own = own;
            state.aggregates = aggregates;
            state.ready = true;
        });
        Ok(())
    }

    /// Re-fetch on server push for changes below the rate item's pool;
    /// subscribes at most once.
    async fn watch_item(&self, item: &str) {
        let Some(push) = self.platform.push() else {
            return;
        };
        let Some(scope) = parent_path(item) else {
            return;
        };
        if self.push_subscribed.swap(true, Ordering::AcqRel) {
            return;
        }

        match push.subscribe(&scope).await {
            Ok(mut subscription) => {
                debug!(scope = %scope, refers_to = %self.refers_to, "watching rate pool");
                let notify = self.notify.clone();
                let task = tokio::spawn(async move {
                    while let Some(event) = subscription.recv().await {
                        debug!(event = %event.event, resource = %event.resource, "rate pool changed");
                        if notify.send(()).is_err() {
                            break;
                        }
                    }
                });
                *self
                    .push_task
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(task);
            }
            Err(e) => {
                warn!(scope = %scope, error = %e, "push subscription failed");
                self.push_subscribed.store(false, Ordering::Release);
            }
        }
    }

    async fn cast(&self, value: i32) -> Result<CastOutcome> {
        let session = self.platform.session();
        let Some(subject) = session.user_path() else {
            let navigator = self.platform.navigator();
            let target = login_redirect(
                &self.platform.config().login_path,
                &navigator.current_location(),
            );
            info!(refers_to = %self.refers_to, "login required to rate");
            navigator.navigate(&target);
            return Ok(CastOutcome::LoginRequired);
        };

        if !self.platform.permissions().can_post(&self.pool).await? {
            warn!(pool = %self.pool, user = subject, "user may not rate here");
            return Ok(CastOutcome::NotPermitted);
        }

        let anonymize = self
            .platform
            .anonymize_policy()
            .decide(&self.pool, self.anonymize, Some(subject))
            .await?;
        let options = PostOptions::anonymized(anonymize);

        let rate = Rate {
            subject: subject.to_string(),
            object: self.refers_to.clone(),
            rate: value,
        };
        let version = self.post_rate(&rate, options).await?;
        debug!(version = %version.path, value, anonymize, "rate cast");

        self.platform
            .events()
            .trigger_others(&self.refers_to, &self.subscription);
        self.refresh().await?;
        Ok(CastOutcome::Cast(value))
    }

    async fn post_rate(&self, rate: &Rate, options: PostOptions) -> Result<Resource> {
        let target = self.ensure_item(&rate.subject, options).await?;

        match self
            .post_version(&target.item, target.head, rate, options)
            .await
        {
            Err(SdkError::Client(ClientError::Fork { path })) => {
                debug!(%path, "head moved, retrying on newest version");
                self.post_version(&target.item, None, rate, options).await
            }
            Err(SdkError::Client(ClientError::Conflict(message))) => {
                warn!(
                    refers_to = %self.refers_to,
                    %message,
                    "rate item was created by another session, switching to it"
                );
                let existing = self
                    .service
                    .fetch_rate(&self.pool, &self.refers_to, &rate.subject)
                    .await?;
                let item = item_of(&existing)?;
                *self
                    .platform
                    .registry()
                    .slot(&rate.subject, &self.refers_to)
                    .lock()
                    .await = Some(item.clone());
                self.post_version(&item, Some(existing), rate, options).await
            }
            other => other,
        }
    }

    /// Find the user's rate item, creating it with its first version in one
    /// transaction if there is none yet.
    async fn ensure_item(&self, subject: &str, options: PostOptions) -> Result<RateTarget> {
        let slot = self.platform.registry().slot(subject, &self.refers_to);
        let mut known = slot.lock().await;

        if let Some(item) = known.as_ref() {
            return Ok(RateTarget {
                item: item.clone(),
                head: None,
            });
        }
        let own = self.state.borrow().own.clone();
        let existing = match own {
            Some(own) if rated_by(&own, subject) => Some(own),
            // fetched for a previous session
            Some(_) => match self
                .service
                .fetch_rate(&self.pool, &self.refers_to, subject)
                .await
            {
                Ok(existing) => Some(existing),
                Err(SdkError::NotFound) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };
        if let Some(existing) = existing {
            let item = item_of(&existing)?;
            *known = Some(item.clone());
            return Ok(RateTarget { item, head: None });
        }

        let client = self.platform.client();
        let mut tx = client.transaction();
        let posted = tx.post(&self.pool, Resource::new(content_types::RATE));
        let first = tx.get(posted.first_version_path.path());
        let result = client.commit(tx, options).await?;

        let first_version = result.get(first)?.clone();
        let item = match result.resolve(&posted.path) {
            Some(path) => path.to_string(),
            None => result.get(posted.index)?.path.clone(),
        };
        info!(item = %item, refers_to = %self.refers_to, "created rate item");

        *known = Some(item.clone());
        Ok(RateTarget {
            item,
            head: Some(first_version),
        })
    }

    async fn post_version(
        &self,
        item: &str,
        head: Option<Resource>,
        rate: &Rate,
        options: PostOptions,
    ) -> Result<Resource> {
        let client = self.platform.client();
        let head = match head {
            Some(head) => head,
            None => {
                let head_path = client.get_newest_version_path_no_fork(item).await?;
                let own = self
                    .state
                    .borrow()
                    .own
                    .clone()
                    .filter(|own| own.path == head_path && rated_by(own, &rate.subject));
                match own {
                    Some(own) => own,
                    None => client.get(&head_path).await?,
                }
            }
        };

        let version = derive_version(&head, |sheets| sheets.set(rate))?;
        Ok(client
            .post_new_version_no_fork(&head.path, version, None, options)
            .await?)
    }
}

/// Whether `version` is a rating by `subject`
fn rated_by(version: &Resource, subject: &str) -> bool {
    matches!(version.data.get::<Rate>(), Ok(Some(rate)) if rate.subject == subject)
}

async fn listen(
    inner: Weak<Inner>,
    mut changes: mpsc::UnboundedReceiver<()>,
    mut session: watch::Receiver<Session>,
) {
    loop {
        tokio::select! {
            change = changes.recv() => {
                if change.is_none() {
                    break;
                }
            }
            changed = session.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!("session changed");
            }
        }
        // one refresh covers a burst of notifications
        while changes.try_recv().is_ok() {}

        let Some(inner) = inner.upgrade() else {
            break;
        };
        if let Err(e) = inner.refresh().await {
            warn!(refers_to = %inner.refers_to, error = %e, "refresh after change failed");
        }
    }
}

/// Rating control for one object
///
/// # Example
///
/// ```rust,no_run
/// use agora_sdk::{CastOutcome, Platform};
///
/// # async fn example(platform: Platform) -> agora_sdk::Result<()> {
/// let widget = platform.rate_widget("/proposals/42/", None).await?;
///
/// if let CastOutcome::Cast(_) = widget.toggle(1).await? {
///     println!("{} people like this", widget.rates(1));
/// }
/// # Ok(())
/// # }
/// ```
pub struct RateWidget {
    inner: Arc<Inner>,
    listener: JoinHandle<()>,
}

impl RateWidget {
    /// Bind a widget to `refers_to`, rated in `pool`, and fetch its state.
    ///
    /// `anonymize` overrides the user's account default for this widget's
    /// casts. Must be called inside a tokio runtime.
    pub async fn mount(
        platform: &Platform,
        refers_to: impl Into<String>,
        pool: impl Into<String>,
        anonymize: Option<bool>,
    ) -> Result<Self> {
        let refers_to = refers_to.into();
        let pool = pool.into();

        let (notify, changes) = mpsc::unbounded_channel();
        let on_change = notify.clone();
        let subscription = platform.events().on(refers_to.clone(), move || {
            let _ = on_change.send(());
        });
        let (state, _) = watch::channel(RateState::default());

        let inner = Arc::new(Inner {
            platform: platform.clone(),
            service: platform.rate_service(),
            refers_to,
            pool,
            anonymize,
            state,
            lock: InFlight::new(),
            notify,
            subscription,
            push_subscribed: AtomicBool::new(false),
            push_task: Mutex::new(None),
        });
        let listener = tokio::spawn(listen(
            Arc::downgrade(&inner),
            changes,
            platform.session_changes(),
        ));
        let widget = Self { inner, listener };

        let workflow = match workflow_state(platform.client().as_ref(), &widget.inner.refers_to).await {
            Ok(state) => state,
            Err(SdkError::NotFound) => None,
            Err(e) => return Err(e),
        };
        widget
            .inner
            .state
            .send_modify(|state| state.workflow_state = workflow);
        widget.inner.refresh().await?;

        debug!(refers_to = %widget.inner.refers_to, pool = %widget.inner.pool, "rate widget mounted");
        Ok(widget)
    }

    /// Store `value` as the user's rating.
    ///
    /// Fails with [`SdkError::Locked`] while another cast of this widget is
    /// in flight.
    pub async fn cast(&self, value: i32) -> Result<CastOutcome> {
        let _guard = self.inner.lock.try_acquire()?;
        self.inner.cast(value).await
    }

    /// Reset to neutral. The rating stays, with value 0.
    pub async fn uncast(&self) -> Result<CastOutcome> {
        self.cast(0).await
    }

    /// Cast `value`, or go back to neutral if it already is the own rating
    pub async fn toggle(&self, value: i32) -> Result<CastOutcome> {
        if self.own_rate() == Some(value) {
            self.uncast().await
        } else {
            self.cast(value).await
        }
    }

    /// Re-fetch own rating and aggregates
    pub async fn refresh(&self) -> Result<()> {
        self.inner.refresh().await
    }

    /// Current ratings of the object with the raters' names
    pub async fn audit_trail(&self) -> Result<Vec<AuditTrailEntry>> {
        self.inner
            .service
            .fetch_audit_trail(&self.inner.pool, &self.inner.refers_to)
            .await
    }

    /// Number of current ratings with `value`; 0 if there are none
    pub fn rates(&self, value: i32) -> u64 {
        self.inner
            .state
            .borrow()
            .aggregates
            .get(&value.to_string())
            .copied()
            .unwrap_or(0)
    }

    pub fn own_rate(&self) -> Option<i32> {
        self.inner.state.borrow().own_rate()
    }

    fn in_result_phase(&self, state: &RateState) -> bool {
        state.workflow_state.as_deref() == Some(self.inner.platform.config().result_state.as_str())
    }

    /// Whether aggregate results are visible
    pub fn show_result(&self) -> bool {
        let state = self.inner.state.borrow();
        self.in_result_phase(&state) || state.own.is_some() || state.show_result_manual
    }

    /// Whether the user gets a control to reveal results by hand
    pub fn show_result_toggle(&self) -> bool {
        let state = self.inner.state.borrow();
        !self.in_result_phase(&state) && state.own.is_none()
    }

    pub fn toggle_show_result(&self) {
        self.inner
            .state
            .send_modify(|state| state.show_result_manual = !state.show_result_manual);
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.borrow().ready
    }

    pub fn is_locked(&self) -> bool {
        self.inner.lock.is_locked()
    }

    /// Snapshot of the widget state
    pub fn state(&self) -> RateState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that wakes on every state update, including refreshes
    /// caused by other widgets or server push
    pub fn changes(&self) -> watch::Receiver<RateState> {
        self.inner.state.subscribe()
    }

    pub fn refers_to(&self) -> &str {
        &self.inner.refers_to
    }

    pub fn pool(&self) -> &str {
        &self.inner.pool
    }
}

impl Drop for RateWidget {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
