use serde::Serialize;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::{
    sync::{watch, Mutex, Notify, RwLock},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};

use crate::{
    client::{with_retry, HubClient, ShadeApi},
    error::{CrestronError, Result},
    protocol::{percent_to_position, CLOSED_PERCENT, OPEN_PERCENT},
    shade::ShadeEntity,
    types::{
        default_room_name, CoordinatorState, HubConfig, HubIssue, PollSnapshot, Shade,
        ShadeCommand, REDACTED,
    },
};

/// Polls one Crestron hub and brokers shade commands
///
/// `ShadeCoordinator` owns the last fetched [`PollSnapshot`] for a hub. A
/// background task refreshes it on the configured interval; entities read
/// from it and send commands through it. Failures never tear the coordinator
/// down: the last good snapshot is kept and the failure is reflected in
/// [`state`](Self::state), [`is_stale`](Self::is_stale) and
/// [`issues`](Self::issues).
///
/// # State machine
///
/// - `Idle → Refreshing → Idle` on every tick
/// - `Refreshing → AuthFailed` when the hub rejects the credentials
/// - `AuthFailed → Idle` once a login succeeds, either on the next tick or
///   through [`reauthenticate`](Self::reauthenticate)
///
/// After `stale_after_failures` consecutive failed refreshes the data is
/// flagged stale; the next successful refresh clears the flag.
///
/// # Examples
///
/// ```no_run
/// use crestron_shades::{Cover, HubConfig, ShadeCoordinator};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let coordinator = Arc::new(
///         ShadeCoordinator::connect(HubConfig::new("192.168.1.20", "my-api-token")).await?,
///     );
///     coordinator.start().await;
///
///     for entity in coordinator.entities() {
///         println!("{} -> {:?}", entity.unique_id(), entity.current_position());
///     }
///
///     coordinator.close_shade(3).await?;
///     coordinator.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ShadeCoordinator {
    inner: Arc<CoordinatorInner>,
    polling_task: Mutex<Option<JoinHandle<()>>>,
}

struct CoordinatorInner {
    api: Arc<dyn ShadeApi>,
    config: HubConfig,
    snapshot_tx: watch::Sender<Arc<PollSnapshot>>,
    health: RwLock<Health>,
    rooms: RwLock<HashMap<u32, String>>,
    refresh_lock: Mutex<()>,
    wake: Notify,
}

#[derive(Debug, Clone)]
struct Health {
    state: CoordinatorState,
    consecutive_failures: u32,
    stale: bool,
    last_update_success: bool,
    last_success: Option<SystemTime>,
    last_error: Option<String>,
    issues: BTreeSet<HubIssue>,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            state: CoordinatorState::Idle,
            consecutive_failures: 0,
            stale: false,
            last_update_success: false,
            last_success: None,
            last_error: None,
            issues: BTreeSet::new(),
        }
    }
}

/// Serializable coordinator summary with secrets redacted
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    /// Hub host
    pub host: String,
    /// Always [`REDACTED`]
    pub auth_token: &'static str,
    /// Polling interval in seconds
    pub scan_interval_secs: u64,
    /// Coordinator state
    pub state: CoordinatorState,
    /// Whether the last refresh succeeded
    pub last_update_success: bool,
    /// Whether stale data is flagged
    pub stale: bool,
    /// Failed refreshes since the last success
    pub consecutive_failures: u32,
    /// Message of the last failure, if any
    pub last_error: Option<String>,
    /// Open operator issues
    pub issues: Vec<HubIssue>,
    /// When the current snapshot was taken
    pub snapshot_timestamp: SystemTime,
    /// Shades in the current snapshot
    pub shades: Vec<Shade>,
}

impl ShadeCoordinator {
    /// Create a coordinator over any [`ShadeApi`]
    ///
    /// The snapshot starts empty; call [`refresh`](Self::refresh) or
    /// [`start`](Self::start) to populate it.
    ///
    /// # Errors
    ///
    /// Returns [`CrestronError::InvalidConfig`] if the config does not validate.
    pub fn new(api: Arc<dyn ShadeApi>, config: HubConfig) -> Result<Self> {
        config.validate()?;
        let (snapshot_tx, _) = watch::channel(Arc::new(PollSnapshot::empty()));

        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                api,
                config,
                snapshot_tx,
                health: RwLock::new(Health::default()),
                rooms: RwLock::new(HashMap::new()),
                refresh_lock: Mutex::new(()),
                wake: Notify::new(),
            }),
            polling_task: Mutex::new(None),
        })
    }

    /// Build an HTTP client, verify the hub and fetch the first snapshot
    ///
    /// The polling task is not started.
    ///
    /// # Errors
    ///
    /// Returns [`CrestronError::Auth`] if the token is rejected, a connection
    /// error if the hub is unreachable, or any error from the first refresh.
    pub async fn connect(config: HubConfig) -> Result<Self> {
        let client = HubClient::new(&config)?;
        let version = client.ping().await?;
        info!(
            host = %config.host,
            version = version.as_deref().unwrap_or("unknown"),
            "Connected to Crestron hub"
        );

        let coordinator = Self::new(Arc::new(client), config)?;
        coordinator.refresh().await?;
        Ok(coordinator)
    }

    /// Stable identifier of this hub, `crestron_{host}`
    #[must_use]
    pub fn unique_id(&self) -> String {
        format!("crestron_{}", self.inner.config.host)
    }

    /// Hub configuration
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Latest snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<PollSnapshot> {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Receiver notified whenever a new snapshot is published
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<PollSnapshot>> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Look up a shade in the latest snapshot
    #[must_use]
    pub fn shade(&self, id: u32) -> Option<Shade> {
        self.inner.snapshot_tx.borrow().get(id).cloned()
    }

    /// Check if a shade is part of the latest snapshot
    #[must_use]
    pub fn has_shade(&self, id: u32) -> bool {
        self.inner.snapshot_tx.borrow().contains(id)
    }

    /// Current coordinator state
    pub async fn state(&self) -> CoordinatorState {
        self.inner.health.read().await.state
    }

    /// Check if stale data is flagged
    pub async fn is_stale(&self) -> bool {
        self.inner.health.read().await.stale
    }

    /// Check if the last refresh succeeded
    pub async fn last_update_success(&self) -> bool {
        self.inner.health.read().await.last_update_success
    }

    /// Failed refreshes since the last success
    pub async fn consecutive_failures(&self) -> u32 {
        self.inner.health.read().await.consecutive_failures
    }

    /// Open operator issues
    pub async fn issues(&self) -> Vec<HubIssue> {
        self.inner.health.read().await.issues.iter().copied().collect()
    }

    /// Check if the snapshot can be trusted by entities
    ///
    /// True once a refresh has succeeded, while the data is not stale and the
    /// credentials are not known to be rejected.
    pub async fn is_healthy(&self) -> bool {
        let health = self.inner.health.read().await;
        health.last_success.is_some()
            && !health.stale
            && health.state != CoordinatorState::AuthFailed
    }

    /// Run one refresh cycle and publish the result
    ///
    /// While in `AuthFailed` a login is attempted first. A failed refresh
    /// leaves the snapshot untouched.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the cycle; it has already been recorded
    /// in the coordinator state.
    pub async fn refresh(&self) -> Result<Arc<PollSnapshot>> {
        self.inner.refresh().await
    }

    /// Wake the polling task for an early refresh
    pub fn request_refresh(&self) {
        self.inner.wake.notify_one();
    }

    /// Log in again, optionally with a new auth token
    ///
    /// # Errors
    ///
    /// Returns the login error; an auth error keeps the coordinator in
    /// `AuthFailed`.
    pub async fn reauthenticate(&self, auth_token: Option<String>) -> Result<()> {
        if let Some(token) = auth_token {
            info!(host = %self.inner.config.host, "Auth token replaced");
            self.inner.api.set_auth_token(token).await;
        }

        self.inner.login().await?;
        self.request_refresh();
        Ok(())
    }

    /// Spawn the polling task, replacing any running one
    ///
    /// The first refresh runs immediately.
    pub async fn start(&self) {
        let inner = Arc::clone(&self.inner);
        let interval = inner.config.scan_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                host = %inner.config.host,
                interval_secs = interval.as_secs(),
                "Shade polling started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = inner.wake.notified() => {
                        debug!(host = %inner.config.host, "Early refresh requested");
                        ticker.reset();
                    }
                }

                // failures are recorded in the health state
                let _ = inner.refresh().await;
            }
        });

        if let Some(previous) = self.polling_task.lock().await.replace(task) {
            previous.abort();
        }
    }

    /// Check if the polling task is running
    pub async fn is_polling(&self) -> bool {
        self.polling_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop the polling task
    pub async fn shutdown(&self) {
        if let Some(task) = self.polling_task.lock().await.take() {
            task.abort();
            info!(host = %self.inner.config.host, "Shade polling stopped");
        }
    }

    /// Move a shade to a position between 0 (closed) and 100 (open)
    ///
    /// On success the new position is published optimistically and an early
    /// refresh is requested.
    ///
    /// # Errors
    ///
    /// Returns [`CrestronError::InvalidParameters`] for positions above 100,
    /// [`CrestronError::ShadeNotFound`] for unknown shades, or the hub error.
    pub async fn set_shade_position(&self, id: u32, position: u8) -> Result<()> {
        if position > OPEN_PERCENT {
            return Err(CrestronError::InvalidParameters(format!(
                "Position {position} is outside 0-100"
            )));
        }
        self.ensure_known(id)?;

        let command = ShadeCommand::position(id, percent_to_position(position));
        self.run_command(id, "set position", self.inner.api.set_shade_state(&[command]))
            .await?;

        self.inner
            .snapshot_tx
            .send_modify(|snapshot| *snapshot = Arc::new(snapshot.with_position(id, position)));
        info!(host = %self.inner.config.host, shade_id = id, position, "Shade position set");

        self.request_refresh();
        Ok(())
    }

    /// Fully open a shade
    ///
    /// # Errors
    ///
    /// See [`set_shade_position`](Self::set_shade_position).
    pub async fn open_shade(&self, id: u32) -> Result<()> {
        self.set_shade_position(id, OPEN_PERCENT).await
    }

    /// Fully close a shade
    ///
    /// # Errors
    ///
    /// See [`set_shade_position`](Self::set_shade_position).
    pub async fn close_shade(&self, id: u32) -> Result<()> {
        self.set_shade_position(id, CLOSED_PERCENT).await
    }

    /// Halt a moving shade
    ///
    /// # Errors
    ///
    /// Returns [`CrestronError::ShadeNotFound`] for unknown shades, or the hub
    /// error.
    pub async fn stop_shade(&self, id: u32) -> Result<()> {
        self.ensure_known(id)?;
        self.run_command(id, "stop", self.inner.api.stop_shade(id))
            .await?;

        info!(host = %self.inner.config.host, shade_id = id, "Shade stopped");
        self.request_refresh();
        Ok(())
    }

    /// One entity per shade in the latest snapshot
    #[must_use]
    pub fn entities(self: &Arc<Self>) -> Vec<ShadeEntity> {
        self.snapshot()
            .ids()
            .map(|id| ShadeEntity::new(Arc::clone(self), id))
            .collect()
    }

    /// Summary for support requests, without the auth token
    pub async fn diagnostics(&self) -> Diagnostics {
        let health = self.inner.health.read().await.clone();
        let snapshot = self.snapshot();

        Diagnostics {
            host: self.inner.config.host.clone(),
            auth_token: REDACTED,
            scan_interval_secs: self.inner.config.scan_interval_secs,
            state: health.state,
            last_update_success: health.last_update_success,
            stale: health.stale,
            consecutive_failures: health.consecutive_failures,
            last_error: health.last_error,
            issues: health.issues.into_iter().collect(),
            snapshot_timestamp: snapshot.timestamp,
            shades: snapshot.shades.values().cloned().collect(),
        }
    }

    fn ensure_known(&self, id: u32) -> Result<()> {
        if self.has_shade(id) {
            Ok(())
        } else {
            Err(CrestronError::ShadeNotFound(id))
        }
    }

    async fn run_command<T>(
        &self,
        id: u32,
        action: &str,
        call: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match call.await {
            Ok(value) => Ok(value),
            Err(e) => {
                error!(
                    host = %self.inner.config.host,
                    shade_id = id,
                    "Shade {} failed: {}",
                    action,
                    e
                );
                if e.is_auth_error() {
                    self.inner.mark_auth_failed(&e).await;
                }
                Err(e)
            }
        }
    }
}

impl Drop for ShadeCoordinator {
    fn drop(&mut self) {
        if let Some(task) = self.polling_task.get_mut().take() {
            task.abort();
        }
    }
}

impl CoordinatorInner {
    async fn refresh(&self) -> Result<Arc<PollSnapshot>> {
        let _guard = self.refresh_lock.lock().await;

        if self.health.read().await.state == CoordinatorState::AuthFailed {
            if let Err(e) = self.login().await {
                self.record_failure(&e).await;
                return Err(e);
            }
        }

        self.health.write().await.state = CoordinatorState::Refreshing;

        let limit = Duration::from_millis(self.config.timeouts.refresh_timeout_ms);
        let fetched = match tokio::time::timeout(limit, self.fetch_shades()).await {
            Ok(result) => result,
            Err(_) => Err(CrestronError::Timeout {
                timeout_ms: self.config.timeouts.refresh_timeout_ms,
            }),
        };

        match fetched {
            Ok(shades) => {
                let snapshot = Arc::new(PollSnapshot::from_shades(shades));
                self.snapshot_tx.send_replace(Arc::clone(&snapshot));
                self.record_success(snapshot.len()).await;
                Ok(snapshot)
            }
            Err(e) => {
                self.record_failure(&e).await;
                Err(e)
            }
        }
    }

    async fn fetch_shades(&self) -> Result<Vec<Shade>> {
        let mut shades = with_retry(&self.config.timeouts, "Shade listing", || {
            self.api.list_shades()
        })
        .await?;

        let needs_rooms = {
            let rooms = self.rooms.read().await;
            shades
                .iter()
                .any(|s| s.room_id > 0 && !rooms.contains_key(&s.room_id))
        };
        if needs_rooms {
            match self.api.list_rooms().await {
                Ok(listed) => {
                    let mut rooms = self.rooms.write().await;
                    rooms.extend(listed.into_iter().map(|r| (r.id, r.name)));
                    // unlisted ids keep their placeholder and are not looked up again
                    for shade in &shades {
                        if shade.room_id > 0 {
                            rooms
                                .entry(shade.room_id)
                                .or_insert_with(|| default_room_name(shade.room_id));
                        }
                    }
                }
                // room names are cosmetic, keep the placeholders
                Err(e) => debug!(host = %self.config.host, "Room listing failed: {}", e),
            }
        }

        let rooms = self.rooms.read().await;
        for shade in &mut shades {
            if let Some(name) = rooms.get(&shade.room_id) {
                shade.room_name.clone_from(name);
            }
        }
        Ok(shades)
    }

    async fn login(&self) -> Result<()> {
        match self.api.login().await {
            Ok(_) => {
                let mut health = self.health.write().await;
                if health.state == CoordinatorState::AuthFailed {
                    health.state = CoordinatorState::Idle;
                }
                if health.issues.remove(&HubIssue::AuthFailure) {
                    info!(host = %self.config.host, "Re-authenticated with hub");
                }
                Ok(())
            }
            Err(e) => {
                if e.is_auth_error() {
                    self.mark_auth_failed(&e).await;
                }
                Err(e)
            }
        }
    }

    async fn mark_auth_failed(&self, e: &CrestronError) {
        let mut health = self.health.write().await;
        if health.state != CoordinatorState::AuthFailed {
            error!(host = %self.config.host, "Hub rejected credentials: {}", e);
        }
        health.state = CoordinatorState::AuthFailed;
        health.issues.insert(HubIssue::AuthFailure);
    }

    async fn record_success(&self, shade_count: usize) {
        let mut health = self.health.write().await;

        if health.stale {
            info!(
                host = %self.config.host,
                failures = health.consecutive_failures,
                "Shade data fresh again"
            );
        }

        health.state = CoordinatorState::Idle;
        health.consecutive_failures = 0;
        health.stale = false;
        health.last_update_success = true;
        health.last_success = Some(SystemTime::now());
        health.last_error = None;
        health.issues.clear();

        debug!(host = %self.config.host, shades = shade_count, "Refresh succeeded");
    }

    async fn record_failure(&self, e: &CrestronError) {
        if e.is_auth_error() {
            self.mark_auth_failed(e).await;
        }

        let mut health = self.health.write().await;
        if health.state == CoordinatorState::Refreshing {
            health.state = CoordinatorState::Idle;
        }
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.last_update_success = false;
        health.last_error = Some(e.to_string());

        warn!(
            host = %self.config.host,
            failures = health.consecutive_failures,
            "Refresh failed: {}",
            e
        );

        if health.consecutive_failures >= self.config.timeouts.stale_after_failures {
            if !health.stale {
                warn!(
                    host = %self.config.host,
                    failures = health.consecutive_failures,
                    "Shade data is stale"
                );
            }
            health.stale = true;
            health.issues.insert(HubIssue::StaleShades);
            if e.is_connection_error() {
                health.issues.insert(HubIssue::Connectivity);
            }
        }
    }
}
