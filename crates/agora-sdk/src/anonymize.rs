//! Anonymized-write policy

use crate::error::Result;
use crate::permissions::PermissionCache;
use agora_client::sheets::AnonymizeDefault;
use agora_client::ResourceClient;
use std::sync::Arc;
use tracing::debug;

/// Decide whether a write is sent anonymized.
///
/// Endpoints that do not accept the anonymize header never get one;
/// otherwise an explicit per-call override wins over the account default.
pub fn resolve_anonymize(supported: bool, override_: Option<bool>, account_default: bool) -> bool {
    if !supported {
        return false;
    }
    override_.unwrap_or(account_default)
}

/// Looks up the inputs of [`resolve_anonymize`]
#[derive(Clone)]
pub struct AnonymizePolicy {
    client: Arc<dyn ResourceClient>,
    permissions: Arc<PermissionCache>,
    header: String,
}

impl AnonymizePolicy {
    pub fn new(
        client: Arc<dyn ResourceClient>,
        permissions: Arc<PermissionCache>,
        header: impl Into<String>,
    ) -> Self {
        Self {
            client,
            permissions,
            header: header.into(),
        }
    }

    /// Whether writes to `path` may be anonymized
    pub async fn supported(&self, path: &str) -> Result<bool> {
        self.permissions.supports_header(path, &self.header).await
    }

    /// The user's account-level preference; `false` if unset
    pub async fn account_default(&self, user_path: &str) -> Result<bool> {
        let user = match self.client.get(user_path).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        Ok(user
            .data
            .get::<AnonymizeDefault>()?
            .map(|sheet| sheet.anonymize)
            .unwrap_or(false))
    }

    /// Anonymize flag for a write to `path` by `user_path`
    pub async fn decide(
        &self,
        path: &str,
        override_: Option<bool>,
        user_path: Option<&str>,
    ) -> Result<bool> {
        let supported = self.supported(path).await?;
        // the account default is only needed when nothing else decides
        let account_default = match (supported, override_, user_path) {
            (true, None, Some(user)) => self.account_default(user).await?,
            _ => false,
        };
        let anonymize = resolve_anonymize(supported, override_, account_default);
        debug!(path, supported, ?override_, anonymize, "anonymize decision");
        Ok(anonymize)
    }
}
