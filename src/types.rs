use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, time::Duration, time::SystemTime};

/// Default polling interval in seconds
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 30;

/// Shade reachability as reported by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Shade answers the hub
    Online,
    /// Shade is unreachable from the hub
    Offline,
}

impl From<&str> for ConnectionStatus {
    fn from(value: &str) -> Self {
        if value.eq_ignore_ascii_case("online") {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A motorized shade with its position normalized to 0-100
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shade {
    /// Hub-assigned id, stable per hub
    pub id: u32,
    /// Display name
    pub name: String,
    /// Position, 0 = closed, 100 = open
    pub position: u8,
    /// Reachability
    pub connection_status: ConnectionStatus,
    /// Room the shade belongs to, 0 if unassigned
    pub room_id: u32,
    /// Room display name
    pub room_name: String,
    /// Hub device subtype
    pub sub_type: String,
}

impl Shade {
    /// Check if the hub reports the shade as reachable
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.connection_status == ConnectionStatus::Online
    }

    /// Check if the shade is fully closed
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.position == 0
    }
}

/// Fallback room name used when the hub has no name for a room id
#[must_use]
pub fn default_room_name(room_id: u32) -> String {
    if room_id > 0 {
        format!("Room {room_id}")
    } else {
        "Unknown Room".to_string()
    }
}

/// Generic hub device from the devices listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Hub-assigned id
    pub id: u32,
    /// Display name
    pub name: String,
    /// Device type, e.g. "Shade" or "Light"
    pub device_type: String,
    /// Device subtype
    pub sub_type: String,
    /// Reachability
    pub connection_status: ConnectionStatus,
    /// Room the device belongs to
    pub room_id: u32,
}

/// Room from the rooms listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Hub-assigned id
    pub id: u32,
    /// Display name
    pub name: String,
}

/// Partial shade update sent through `setstate`
///
/// Fields left as `None` are omitted from the request body so the hub keeps
/// their current values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadeCommand {
    /// Target shade
    pub id: u32,
    /// Raw hub position (0-65535)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u16>,
}

impl ShadeCommand {
    /// Move a shade to a raw hub position
    #[must_use]
    pub const fn position(id: u32, raw_position: u16) -> Self {
        Self {
            id,
            position: Some(raw_position),
        }
    }
}

/// Last fetched shade state, replaced as a whole on every update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollSnapshot {
    /// When the data was fetched or last acknowledged
    pub timestamp: SystemTime,
    /// Shades keyed by id
    pub shades: BTreeMap<u32, Shade>,
}

impl PollSnapshot {
    /// Build a snapshot from a full shade listing
    #[must_use]
    pub fn from_shades(shades: Vec<Shade>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            shades: shades.into_iter().map(|s| (s.id, s)).collect(),
        }
    }

    /// Empty snapshot used before the first successful refresh
    #[must_use]
    pub fn empty() -> Self {
        Self {
            timestamp: SystemTime::UNIX_EPOCH,
            shades: BTreeMap::new(),
        }
    }

    /// Look up a shade
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Shade> {
        self.shades.get(&id)
    }

    /// Check if a shade id is part of the snapshot
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.shades.contains_key(&id)
    }

    /// Shade ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.shades.keys().copied()
    }

    /// Number of shades
    #[must_use]
    pub fn len(&self) -> usize {
        self.shades.len()
    }

    /// Check if no shades are known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shades.is_empty()
    }

    /// Copy of this snapshot with one shade moved to `position`
    ///
    /// Unknown ids leave the copy unchanged apart from the timestamp.
    #[must_use]
    pub fn with_position(&self, id: u32, position: u8) -> Self {
        let mut shades = self.shades.clone();
        if let Some(shade) = shades.get_mut(&id) {
            shade.position = position;
        }
        Self {
            timestamp: SystemTime::now(),
            shades,
        }
    }
}

/// Polling coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinatorState {
    /// Waiting for the next tick
    Idle,
    /// A refresh is in flight
    Refreshing,
    /// The hub rejected our credentials; a re-login is required
    AuthFailed,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Refreshing => write!(f, "Refreshing"),
            Self::AuthFailed => write!(f, "Authentication Failed"),
        }
    }
}

/// Operator-facing problems raised by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HubIssue {
    /// Auth token needs to be replaced
    AuthFailure,
    /// Hub has been unreachable for several refreshes
    Connectivity,
    /// Shade data has not been refreshed for several intervals
    StaleShades,
}

impl HubIssue {
    /// Stable identifier for the issue kind
    #[must_use]
    pub const fn issue_id(self) -> &'static str {
        match self {
            Self::AuthFailure => "auth_failure",
            Self::Connectivity => "connectivity",
            Self::StaleShades => "stale_shades",
        }
    }
}

impl fmt::Display for HubIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.issue_id())
    }
}

/// Hub connection settings supplied by the user
#[derive(Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// IP address or hostname, optionally with an `http://` or `https://` scheme
    pub host: String,
    /// Long-lived REST API token configured on the hub
    pub auth_token: String,
    /// Seconds between refreshes
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// Request timeouts and retry behavior
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

const fn default_scan_interval_secs() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECS
}

impl HubConfig {
    /// Create a config with default interval and timeouts
    pub fn new(host: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            auth_token: auth_token.into(),
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            timeouts: TimeoutConfig::default(),
        }
    }

    /// Polling interval
    #[must_use]
    pub const fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Base URL of the REST API, e.g. `http://10.0.0.5/cws/api`
    #[must_use]
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}{}", crate::protocol::API_BASE_PATH)
        } else {
            format!("http://{host}{}", crate::protocol::API_BASE_PATH)
        }
    }

    /// Check the config is usable
    ///
    /// # Errors
    ///
    /// Returns [`crate::CrestronError::InvalidConfig`] if the host or token is
    /// empty, the scan interval is zero, or the stale threshold is zero.
    pub fn validate(&self) -> crate::Result<()> {
        if self.host.trim().is_empty() {
            return Err(crate::CrestronError::InvalidConfig(
                "host must not be empty".to_string(),
            ));
        }
        if self.auth_token.trim().is_empty() {
            return Err(crate::CrestronError::InvalidConfig(
                "auth token must not be empty".to_string(),
            ));
        }
        if self.scan_interval_secs == 0 {
            return Err(crate::CrestronError::InvalidConfig(
                "scan interval must be at least one second".to_string(),
            ));
        }
        if self.timeouts.stale_after_failures == 0 {
            return Err(crate::CrestronError::InvalidConfig(
                "stale threshold must be at least one failure".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for HubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubConfig")
            .field("host", &self.host)
            .field("auth_token", &REDACTED)
            .field("scan_interval_secs", &self.scan_interval_secs)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

/// Placeholder printed instead of secrets
pub const REDACTED: &str = "**REDACTED**";

/// Request timeout and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-request HTTP timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Upper bound for one whole refresh cycle in milliseconds
    pub refresh_timeout_ms: u64,
    /// Maximum retry attempts for connection failures on reads
    pub max_retry_attempts: u32,
    /// Delay before the first retry in milliseconds, doubled per attempt
    pub retry_delay_ms: u64,
    /// Consecutive failed refreshes before data is flagged stale
    pub stale_after_failures: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            refresh_timeout_ms: 30_000,
            max_retry_attempts: 3,
            retry_delay_ms: 500,
            stale_after_failures: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shade(id: u32, position: u8) -> Shade {
        Shade {
            id,
            name: format!("Shade {id}"),
            position,
            connection_status: ConnectionStatus::Online,
            room_id: 1,
            room_name: "Room 1".to_string(),
            sub_type: "Shade".to_string(),
        }
    }

    #[test]
    fn test_connection_status_from_str() {
        assert_eq!(ConnectionStatus::from("online"), ConnectionStatus::Online);
        assert_eq!(ConnectionStatus::from("ONLINE"), ConnectionStatus::Online);
        assert_eq!(ConnectionStatus::from("offline"), ConnectionStatus::Offline);
        assert_eq!(ConnectionStatus::from(""), ConnectionStatus::Offline);
    }

    #[test]
    fn test_default_room_name() {
        assert_eq!(default_room_name(4), "Room 4");
        assert_eq!(default_room_name(0), "Unknown Room");
    }

    #[test]
    fn test_snapshot_with_position_leaves_original_untouched() {
        let snapshot = PollSnapshot::from_shades(vec![shade(1, 20), shade(2, 80)]);
        let moved = snapshot.with_position(1, 100);

        assert_eq!(snapshot.get(1).map(|s| s.position), Some(20));
        assert_eq!(moved.get(1).map(|s| s.position), Some(100));
        assert_eq!(moved.get(2), snapshot.get(2));

        let unknown = snapshot.with_position(9, 50);
        assert_eq!(unknown.shades, snapshot.shades);
    }

    #[test]
    fn test_snapshot_ids_sorted() {
        let snapshot = PollSnapshot::from_shades(vec![shade(7, 0), shade(3, 0), shade(5, 0)]);
        assert_eq!(snapshot.ids().collect::<Vec<_>>(), vec![3, 5, 7]);
        assert_eq!(snapshot.len(), 3);
        assert!(PollSnapshot::empty().is_empty());
    }

    #[test]
    fn test_shade_command_serialization() {
        let json = serde_json::to_value(ShadeCommand::position(12, 65535)).unwrap();
        assert_eq!(json, serde_json::json!({ "id": 12, "position": 65535 }));

        let partial = ShadeCommand {
            id: 3,
            position: None,
        };
        assert_eq!(
            serde_json::to_value(partial).unwrap(),
            serde_json::json!({ "id": 3 })
        );
    }

    #[test]
    fn test_hub_config_defaults_and_base_url() {
        let config = HubConfig::new("192.168.1.20", "token");
        assert_eq!(config.scan_interval(), Duration::from_secs(30));
        assert_eq!(config.base_url(), "http://192.168.1.20/cws/api");

        let with_scheme = HubConfig::new("https://hub.local/", "token");
        assert_eq!(with_scheme.base_url(), "https://hub.local/cws/api");
    }

    #[test]
    fn test_hub_config_validation() {
        assert!(HubConfig::new("hub", "token").validate().is_ok());
        assert!(HubConfig::new("  ", "token").validate().is_err());
        assert!(HubConfig::new("hub", "").validate().is_err());

        let mut zero_interval = HubConfig::new("hub", "token");
        zero_interval.scan_interval_secs = 0;
        assert!(zero_interval.validate().is_err());
    }

    #[test]
    fn test_hub_config_deserialize_with_defaults() {
        let config: HubConfig =
            serde_json::from_str(r#"{ "host": "hub", "auth_token": "secret" }"#).unwrap();
        assert_eq!(config.scan_interval_secs, DEFAULT_SCAN_INTERVAL_SECS);
        assert_eq!(config.timeouts.stale_after_failures, 3);
        assert_eq!(config.timeouts.request_timeout_ms, 10_000);
    }

    #[test]
    fn test_hub_config_debug_redacts_token() {
        let config = HubConfig::new("hub", "super-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains(REDACTED));
    }

    #[test]
    fn test_timeout_config_defaults() {
        let config = TimeoutConfig::default();

        assert_eq!(config.request_timeout_ms, 10_000);
        assert_eq!(config.refresh_timeout_ms, 30_000);
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.retry_delay_ms, 500);
        assert_eq!(config.stale_after_failures, 3);
    }

    #[test]
    fn test_hub_issue_ids() {
        assert_eq!(HubIssue::AuthFailure.issue_id(), "auth_failure");
        assert_eq!(HubIssue::Connectivity.to_string(), "connectivity");
        assert_eq!(HubIssue::StaleShades.issue_id(), "stale_shades");
    }
}
