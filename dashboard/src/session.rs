use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::errors::ValidationFailure;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

/// Trims both fields and rejects empty ones, password first.
pub fn parse_credentials(user: &str, password: &str) -> Result<Credentials, ValidationFailure> {
    let user = user.trim();
    let password = password.trim();

    if password.is_empty() {
        return Err(ValidationFailure::MissingPassword);
    }
    if user.is_empty() {
        return Err(ValidationFailure::MissingUser);
    }

    Ok(Credentials::new(user, password))
}

/// Plain comparison against the single configured tenant.
pub fn authenticate(
    user: &str,
    password: &str,
    expected: &Credentials,
) -> Result<(), ValidationFailure> {
    let given = parse_credentials(user, password)?;
    if given != *expected {
        return Err(ValidationFailure::InvalidCredentials);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Unauthenticated,
    Browsing,
    Viewing(String),
    LiveMonitoring(String),
}

impl State {
    /// Display key of the truck on screen, if any.
    pub fn selected(&self) -> Option<&str> {
        match self {
            State::Viewing(key) | State::LiveMonitoring(key) => Some(key),
            _ => None,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, State::LiveMonitoring(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Login { user: String, password: String },
    Select(String),
    Back,
    ToggleLive,
    Reset,
    Tick,
}

/// Per-user dashboard context, handed to every handler.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    authenticated: bool,
    state: State,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            authenticated: false,
            state: State::Unauthenticated,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Stays authenticated for the rest of the session.
    pub(crate) fn authenticate(&mut self) {
        self.authenticated = true;
        self.state = State::Browsing;
    }

    pub(crate) fn transition(&mut self, state: State) {
        debug_assert!(self.authenticated || state == State::Unauthenticated);
        self.state = state;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Level {
    Success,
    Info,
    Warning,
    Error,
}

/// User-facing status message produced by each handled event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: Level,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self::with(Level::Success, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::with(Level::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::with(Level::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::with(Level::Error, text)
    }

    fn with(level: Level, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            Level::Success => "ok",
            Level::Info => "info",
            Level::Warning => "warn",
            Level::Error => "error",
        };
        write!(f, "[{}] {}", tag, self.text)
    }
}
