//! Token manager with scheduled refresh
//!
//! Manages the token lifecycle:
//! - Single in-memory token, replaced wholesale on set/refresh
//! - Refresh timer firing `refresh_buffer` before expiry
//! - Single-flight refresh through the [`TokenRefresher`] port
//! - Lifecycle notifications over a broadcast channel

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use devicegate_common::time::{schedule_once, Clock, SystemClock, TimerHandle};
use devicegate_domain::{
    AuthConfig, AuthToken, GatewayError, GatewayResult, RefreshedToken, TokenEvent, TokenState,
    TokenValidation,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::ports::TokenRefresher;

const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(5 * 60);
const EVENT_CAPACITY: usize = 16;

/// Token manager settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenManagerConfig {
    /// Refresh this long before expiry; also the "expires soon" window
    pub refresh_buffer: Duration,
    /// Lifetime applied when a token arrives without one
    pub default_expires_in: Duration,
}

impl Default for TokenManagerConfig {
    fn default() -> Self {
        Self { refresh_buffer: DEFAULT_REFRESH_BUFFER, default_expires_in: DEFAULT_EXPIRES_IN }
    }
}

impl From<&AuthConfig> for TokenManagerConfig {
    fn from(config: &AuthConfig) -> Self {
        Self { refresh_buffer: config.refresh_buffer(), ..Self::default() }
    }
}

#[derive(Default)]
struct TokenSlot {
    token: Option<AuthToken>,
    /// Bumped on every replacement or removal
    generation: u64,
    /// Set when validation dropped an expired token
    expired: bool,
}

struct Inner<C: Clock> {
    clock: Arc<C>,
    refresher: Arc<dyn TokenRefresher>,
    config: TokenManagerConfig,
    slot: RwLock<TokenSlot>,
    refresh_lock: tokio::sync::Mutex<()>,
    timer: Mutex<Option<TimerHandle>>,
    events: broadcast::Sender<TokenEvent>,
}

impl<C: Clock> Drop for Inner<C> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.cancel();
        }
    }
}

/// Owns the current [`AuthToken`] and keeps it fresh
///
/// Cloning is cheap; clones share the same token. The refresh timer holds a
/// weak reference, so dropping every clone stops it.
pub struct TokenManager<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> Clone for TokenManager<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: Clock> fmt::Debug for TokenManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish()
    }
}

impl TokenManager<SystemClock> {
    /// Create a token manager on the system clock
    #[must_use]
    pub fn new(refresher: Arc<dyn TokenRefresher>, config: TokenManagerConfig) -> Self {
        Self::with_clock(refresher, config, Arc::new(SystemClock))
    }
}

impl<C: Clock> TokenManager<C> {
    /// Create a token manager with a custom clock (useful for testing)
    #[must_use]
    pub fn with_clock(
        refresher: Arc<dyn TokenRefresher>,
        config: TokenManagerConfig,
        clock: Arc<C>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                clock,
                refresher,
                config,
                slot: RwLock::new(TokenSlot::default()),
                refresh_lock: tokio::sync::Mutex::new(()),
                timer: Mutex::new(None),
                events,
            }),
        }
    }

    /// Store a new token and schedule its refresh
    ///
    /// `expires_in_seconds` defaults to 24 hours. Must be called from within
    /// a Tokio runtime.
    pub fn set_token(
        &self,
        token: impl Into<String>,
        expires_in_seconds: Option<u64>,
        refresh_token: Option<String>,
        scopes: Option<Vec<String>>,
    ) {
        let expires_in =
            expires_in_seconds.map_or(self.inner.config.default_expires_in, Duration::from_secs);
        let token = AuthToken::new(token, self.inner.clock.now(), expires_in)
            .with_refresh_token(refresh_token)
            .with_scopes(scopes);
        self.install(token);
        info!(expires_in_secs = expires_in.as_secs(), "Authentication token set");
    }

    /// Seed the manager from startup configuration
    ///
    /// Returns `false` (and logs a warning) when no bootstrap token is
    /// configured.
    pub fn initialize_token(&self, config: &AuthConfig) -> bool {
        match config.bootstrap_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => {
                self.set_token(
                    token,
                    config.token_expires_in_secs,
                    config.refresh_token.clone(),
                    None,
                );
                true
            }
            _ => {
                warn!("No bootstrap token configured; API calls will fail until a token is set");
                false
            }
        }
    }

    /// Current token string without validation
    pub fn get_token(&self) -> Option<String> {
        self.inner.slot.read().token.as_ref().map(|t| t.token.clone())
    }

    /// Current token with its metadata
    pub fn get_full_token(&self) -> Option<AuthToken> {
        self.inner.slot.read().token.clone()
    }

    /// Check the current token against the clock
    ///
    /// An expired token is dropped and [`TokenEvent::Expired`] is published.
    pub fn validate_token(&self) -> TokenValidation {
        let now = self.inner.clock.now();
        let mut slot = self.inner.slot.write();

        let (expired, expires_soon) = match slot.token.as_ref() {
            None => return TokenValidation::default(),
            Some(token) => (
                token.is_expired(now),
                token.expires_within(now, self.inner.config.refresh_buffer),
            ),
        };

        if expired {
            slot.token = None;
            slot.generation += 1;
            slot.expired = true;
            drop(slot);

            self.cancel_timer();
            warn!("Authentication token expired");
            self.emit(TokenEvent::Expired);
            return TokenValidation::default();
        }

        TokenValidation { is_valid: true, expires_soon }
    }

    /// Return a usable token, refreshing first when it is about to expire
    ///
    /// # Errors
    /// - `AUTH_MISSING_TOKEN` if no token is set
    /// - `AUTH_TOKEN_EXPIRED` if the token has expired
    pub async fn ensure_valid_token(&self) -> GatewayResult<String> {
        let validation = self.validate_token();
        if !validation.is_valid {
            let expired = self.inner.slot.read().expired;
            return Err(if expired {
                GatewayError::token_expired()
            } else {
                GatewayError::missing_token("No authentication token configured")
            });
        }

        if validation.expires_soon && self.can_refresh() {
            debug!("Token expiring soon, refreshing before use");
            if let Err(err) = self.refresh_token().await {
                warn!(error = %err, "Pre-emptive token refresh failed, using current token");
            }
        }

        self.get_token().ok_or_else(GatewayError::token_expired)
    }

    /// Exchange the refresh token for a new token
    ///
    /// Concurrent callers share one refresh: a caller that waited while
    /// another refresh replaced the token returns without a second call.
    ///
    /// # Errors
    /// `AUTH_MISSING_TOKEN` without a refresh token, otherwise whatever the
    /// refresher reports.
    pub async fn refresh_token(&self) -> GatewayResult<()> {
        let observed = self.generation();
        let _guard = self.inner.refresh_lock.lock().await;

        let (generation, refresh_token) = {
            let slot = self.inner.slot.read();
            let Some(token) = slot.token.as_ref() else {
                return Err(GatewayError::missing_token("No token to refresh"));
            };
            if slot.generation != observed {
                debug!("Token replaced while waiting, skipping refresh");
                return Ok(());
            }
            (slot.generation, token.refresh_token.clone().filter(|t| !t.is_empty()))
        };
        let refresh_token = refresh_token
            .ok_or_else(|| GatewayError::missing_token("No refresh token available"))?;

        debug!("Refreshing authentication token");
        match self.inner.refresher.refresh(&refresh_token).await {
            Ok(refreshed) => {
                if self.generation() != generation {
                    debug!("Token changed during refresh, discarding result");
                    return Ok(());
                }
                self.install_refreshed(refreshed, refresh_token);
                info!("Authentication token refreshed");
                self.emit(TokenEvent::Refreshed);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Token refresh failed");
                self.emit(TokenEvent::RefreshFailed { reason: err.to_string() });
                Err(err)
            }
        }
    }

    /// Drop the current token and cancel its refresh timer
    pub fn clear_token(&self) {
        self.cancel_timer();
        {
            let mut slot = self.inner.slot.write();
            slot.token = None;
            slot.generation += 1;
            slot.expired = false;
        }
        info!("Authentication token cleared");
        self.emit(TokenEvent::Cleared);
    }

    /// Subscribe to lifecycle notifications
    pub fn subscribe(&self) -> broadcast::Receiver<TokenEvent> {
        self.inner.events.subscribe()
    }

    /// Lifecycle state computed from the clock, without side effects
    pub fn state(&self) -> TokenState {
        let now = self.inner.clock.now();
        let slot = self.inner.slot.read();
        match slot.token.as_ref() {
            None if slot.expired => TokenState::Expired,
            None => TokenState::NoToken,
            Some(token) if token.is_expired(now) => TokenState::Expired,
            Some(token) if token.expires_within(now, self.inner.config.refresh_buffer) => {
                TokenState::ExpiringSoon
            }
            Some(_) => TokenState::Valid,
        }
    }

    /// Whether a refresh timer is pending
    pub fn has_scheduled_refresh(&self) -> bool {
        self.inner.timer.lock().as_ref().is_some_and(|t| !t.is_cancelled() && !t.is_finished())
    }

    pub fn config(&self) -> &TokenManagerConfig {
        &self.inner.config
    }

    fn can_refresh(&self) -> bool {
        self.inner.slot.read().token.as_ref().is_some_and(AuthToken::can_refresh)
    }

    fn generation(&self) -> u64 {
        self.inner.slot.read().generation
    }

    fn emit(&self, event: TokenEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn install(&self, token: AuthToken) {
        let delay = token
            .remaining(self.inner.clock.now())
            .saturating_sub(self.inner.config.refresh_buffer);
        let generation = {
            let mut slot = self.inner.slot.write();
            slot.token = Some(token);
            slot.generation += 1;
            slot.expired = false;
            slot.generation
        };
        self.schedule_refresh(delay, generation);
    }

    fn install_refreshed(&self, refreshed: RefreshedToken, previous_refresh_token: String) {
        let expires_in =
            refreshed.expires_in.map_or(self.inner.config.default_expires_in, Duration::from_secs);
        let token = AuthToken::new(refreshed.token, self.inner.clock.now(), expires_in)
            .with_refresh_token(refreshed.refresh_token.or(Some(previous_refresh_token)))
            .with_scopes(refreshed.scopes);
        self.install(token);
    }

    fn schedule_refresh(&self, delay: Duration, generation: u64) {
        let weak = Arc::downgrade(&self.inner);
        let handle = schedule_once(delay, async move {
            // Detached: installing the refreshed token replaces this timer
            tokio::spawn(async move {
                if let Some(inner) = weak.upgrade() {
                    TokenManager { inner }.refresh_in_background(generation).await;
                }
            });
        });
        debug!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Token refresh scheduled"
        );

        if let Some(previous) = self.inner.timer.lock().replace(handle) {
            previous.cancel();
        }
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.cancel();
        }
    }

    async fn refresh_in_background(&self, generation: u64) {
        if self.generation() != generation {
            return;
        }
        if !self.can_refresh() {
            warn!("Token nearing expiry but no refresh token is available");
            return;
        }
        if let Err(err) = self.refresh_token().await {
            error!(error = %err, "Scheduled token refresh failed");
        }
    }
}
