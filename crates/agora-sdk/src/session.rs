//! Current user and navigation seam

use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Who is using the client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    user_path: Option<String>,
    token: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(user_path: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_path: Some(user_path.into()),
            token: Some(token.into()),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_path.is_some()
    }

    /// Path of the logged-in user's resource
    pub fn user_path(&self) -> Option<&str> {
        self.user_path.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Location handling of the host application
pub trait Navigator: Send + Sync {
    /// Where the user currently is
    fn current_location(&self) -> String;

    /// Send the user elsewhere
    fn navigate(&self, location: &str);
}

/// Login location that brings the user back to `return_to` afterwards
pub fn login_redirect(login_path: &str, return_to: &str) -> String {
    format!("{}?return_to={}", login_path, urlencoding::encode(return_to))
}

/// Navigator that only records where it was sent
#[derive(Debug, Default)]
pub struct MemoryNavigator {
    state: Mutex<NavigatorState>,
}

#[derive(Debug, Default)]
struct NavigatorState {
    location: String,
    history: Vec<String>,
}

impl MemoryNavigator {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(NavigatorState {
                location: location.into(),
                history: Vec::new(),
            }),
        }
    }

    /// Every location navigated to, oldest first
    pub fn history(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .clone()
    }
}

impl Navigator for MemoryNavigator {
    fn current_location(&self) -> String {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .location
            .clone()
    }

    fn navigate(&self, location: &str) {
        info!(location, "navigate");
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.location = location.to_string();
        state.history.push(location.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_redirect_encodes_return_path() {
        assert_eq!(
            login_redirect("/login", "/processes/budget/?tab=proposals"),
            "/login?return_to=%2Fprocesses%2Fbudget%2F%3Ftab%3Dproposals"
        );
    }

    #[test]
    fn test_memory_navigator_records() {
        let nav = MemoryNavigator::new("/proposals/42/");
        nav.navigate("/login?return_to=%2Fproposals%2F42%2F");

        assert_eq!(nav.current_location(), "/login?return_to=%2Fproposals%2F42%2F");
        assert_eq!(nav.history().len(), 1);
    }

    #[test]
    fn test_session_roles() {
        assert!(!Session::anonymous().is_authenticated());
        let session = Session::authenticated("/principals/users/0000001/", "t");
        assert_eq!(session.user_path(), Some("/principals/users/0000001/"));
    }
}
