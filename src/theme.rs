//! Light/dark theme tracking.
//!
//! [`ThemeController`] holds the user's [`ThemePreference`] and the
//! [`ResolvedTheme`] currently applied to the UI root. With the `system`
//! preference the resolved theme follows the OS; explicit preferences pin
//! it. The preference is persisted through a [`PreferenceStore`] and
//! restored on construction.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::ThemeConfig;
use crate::error::ThemeError;

// ============================================================================
// Preference / Resolved
// ============================================================================

/// The user's theme choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    Light,
    Dark,
    #[default]
    System,
}

impl ThemePreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }

    /// The theme this preference pins, or `None` for `System`.
    pub fn explicit(&self) -> Option<ResolvedTheme> {
        match self {
            Self::Light => Some(ResolvedTheme::Light),
            Self::Dark => Some(ResolvedTheme::Dark),
            Self::System => None,
        }
    }
}

impl fmt::Display for ThemePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`ThemePreference`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown theme preference: {0}")]
pub struct ParsePreferenceError(String);

impl FromStr for ThemePreference {
    type Err = ParsePreferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "system" => Ok(Self::System),
            other => Err(ParsePreferenceError(other.to_string())),
        }
    }
}

/// The theme actually applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum ResolvedTheme {
    #[default]
    Light,
    Dark,
}

// ============================================================================
// Collaborators
// ============================================================================

/// Callback invoked with every OS theme change.
pub type ThemeHandler = Arc<dyn Fn(ResolvedTheme) + Send + Sync>;

/// Removes an OS theme-change registration.
pub type Unlisten = Box<dyn FnOnce() + Send + Sync>;

/// The host window's theme API.
pub trait OsTheme: Send + Sync {
    /// The current OS theme, `None` when the OS does not report one.
    fn theme(&self) -> impl Future<Output = Result<Option<ResolvedTheme>, ThemeError>> + Send;

    /// Registers `handler` for OS theme changes until the returned
    /// [`Unlisten`] is called.
    fn on_theme_changed(
        &self,
        handler: ThemeHandler,
    ) -> impl Future<Output = Result<Unlisten, ThemeError>> + Send;
}

impl<O: OsTheme> OsTheme for Arc<O> {
    fn theme(&self) -> impl Future<Output = Result<Option<ResolvedTheme>, ThemeError>> + Send {
        (**self).theme()
    }

    fn on_theme_changed(
        &self,
        handler: ThemeHandler,
    ) -> impl Future<Output = Result<Unlisten, ThemeError>> + Send {
        (**self).on_theme_changed(handler)
    }
}

/// Durable string key-value storage.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Persists `value`, failing with [`ThemeError::Storage`].
    fn set(&self, key: &str, value: &str) -> Result<(), ThemeError>;
}

/// The visual root the resolved theme is applied to.
pub trait ThemeTarget: Send + Sync + 'static {
    fn apply(&self, theme: ResolvedTheme);
}

/// A [`PreferenceStore`] kept in memory.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ThemeError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl<P: PreferenceStore> PreferenceStore for Arc<P> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ThemeError> {
        (**self).set(key, value)
    }
}

// ============================================================================
// ThemeController
// ============================================================================

/// Events buffered per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 64;

/// Delivered to theme subscribers after every applied theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeEvent {
    pub preference: ThemePreference,
    pub resolved: ResolvedTheme,
}

#[derive(Debug, Clone, Copy)]
struct ThemeState {
    preference: ThemePreference,
    resolved: ResolvedTheme,
}

/// State reachable from the OS change handler.
struct ThemeShared<T> {
    state: Mutex<ThemeState>,
    target: T,
    event_tx: broadcast::Sender<ThemeEvent>,
}

impl<T: ThemeTarget> ThemeShared<T> {
    fn lock(&self) -> MutexGuard<'_, ThemeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, theme: ResolvedTheme) {
        let preference = {
            let mut state = self.lock();
            state.resolved = theme;
            state.preference
        };
        self.target.apply(theme);
        // No subscribers is fine
        let _ = self.event_tx.send(ThemeEvent {
            preference,
            resolved: theme,
        });
    }

    /// Applies an OS theme unless an explicit preference pins the theme.
    fn apply_if_system(&self, theme: ResolvedTheme) {
        if self.lock().preference == ThemePreference::System {
            self.apply(theme);
        }
    }
}

/// Tracks the theme preference and keeps the UI root in sync with it.
pub struct ThemeController<O: OsTheme, P: PreferenceStore, T: ThemeTarget> {
    os: O,
    store: P,
    config: ThemeConfig,
    shared: Arc<ThemeShared<T>>,
    unlisten: Mutex<Option<Unlisten>>,
}

impl<O: OsTheme, P: PreferenceStore, T: ThemeTarget> ThemeController<O, P, T> {
    /// Creates a controller, restoring the persisted preference if valid.
    ///
    /// Nothing is applied until [`init`](Self::init).
    ///
    /// # Arguments
    ///
    /// * `os` - The host window's theme API
    /// * `store` - Where the preference is persisted
    /// * `target` - The visual root the resolved theme is applied to
    /// * `config` - Storage key and fallback theme
    pub fn new(os: O, store: P, target: T, config: ThemeConfig) -> Self {
        let preference = match store.get(&config.storage_key) {
            Some(stored) => stored.parse().unwrap_or_else(|err: ParsePreferenceError| {
                warn!(error = %err, "Ignoring stored theme preference");
                ThemePreference::default()
            }),
            None => ThemePreference::default(),
        };
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            os,
            store,
            shared: Arc::new(ThemeShared {
                state: Mutex::new(ThemeState {
                    preference,
                    resolved: config.fallback,
                }),
                target,
                event_tx,
            }),
            config,
            unlisten: Mutex::new(None),
        }
    }

    /// Resolves and applies the theme, then follows OS theme changes until
    /// [`destroy`](Self::destroy).
    pub async fn init(&self) -> Result<(), ThemeError> {
        let preference = self.preference();
        let theme = match preference.explicit() {
            Some(theme) => theme,
            None => self.query_system().await?,
        };
        self.shared.apply(theme);

        let shared = Arc::clone(&self.shared);
        let handler: ThemeHandler = Arc::new(move |theme| shared.apply_if_system(theme));
        let unlisten = self.os.on_theme_changed(handler).await?;

        if let Some(previous) = self.lock_unlisten().replace(unlisten) {
            debug!("Replacing existing theme change subscription");
            previous();
        }
        Ok(())
    }

    /// Stores `preference` and applies the theme it resolves to.
    ///
    /// A failure to persist is returned after the theme has been applied.
    pub async fn set_preference(&self, preference: ThemePreference) -> Result<(), ThemeError> {
        self.shared.lock().preference = preference;

        let persisted = self.store.set(&self.config.storage_key, preference.as_str());
        if let Err(err) = &persisted {
            warn!(error = %err, "Failed to persist theme preference");
        }

        match preference.explicit() {
            Some(theme) => self.shared.apply(theme),
            None => {
                let theme = self.query_system().await?;
                // The preference may have changed while querying.
                self.shared.apply_if_system(theme);
            }
        }
        persisted
    }

    /// The user's current preference.
    pub fn preference(&self) -> ThemePreference {
        self.shared.lock().preference
    }

    /// The theme last applied to the target, or the configured fallback
    /// before `init()`.
    pub fn resolved(&self) -> ResolvedTheme {
        self.shared.lock().resolved
    }

    /// Subscribe to applied themes.
    ///
    /// The receiver gets a [`ThemeEvent`] every time a theme is applied to
    /// the target, including OS-driven changes. Dropping it unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<ThemeEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Stops following OS theme changes. Safe to call repeatedly.
    pub fn destroy(&self) {
        if let Some(unlisten) = self.lock_unlisten().take() {
            unlisten();
            debug!("Theme change subscription removed");
        }
    }

    async fn query_system(&self) -> Result<ResolvedTheme, ThemeError> {
        Ok(self.os.theme().await?.unwrap_or(self.config.fallback))
    }

    fn lock_unlisten(&self) -> MutexGuard<'_, Option<Unlisten>> {
        self.unlisten.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<O: OsTheme, P: PreferenceStore, T: ThemeTarget> Drop for ThemeController<O, P, T> {
    fn drop(&mut self) {
        self.destroy();
    }
}
