//! Wire format of the Crestron Home REST API.
//!
//! Everything the hub sends or expects lives here: endpoint paths, header
//! names, JSON envelopes and the position scale conversion. The client only
//! moves these structures over HTTP.

use crate::types::{default_room_name, ConnectionStatus, Device, Room, Shade, ShadeCommand};
use serde::{Deserialize, Serialize};

/// Header carrying the long-lived token on `login` and `ping`
pub const AUTH_TOKEN_HEADER: &str = "Crestron-RestAPI-AuthToken";

/// Header carrying the session auth key on every other call
pub const AUTH_KEY_HEADER: &str = "Crestron-RestAPI-AuthKey";

/// Path prefix of the REST API on the hub
pub const API_BASE_PATH: &str = "/cws/api";

/// Login endpoint, relative to the API base
pub const LOGIN_PATH: &str = "/login";

/// Shade listing endpoint
pub const SHADES_PATH: &str = "/shades";

/// Batch shade update endpoint
pub const SET_STATE_PATH: &str = "/shades/setstate";

/// Device listing endpoint
pub const DEVICES_PATH: &str = "/devices";

/// Room listing endpoint
pub const ROOMS_PATH: &str = "/rooms";

/// `status` value the hub returns for an accepted `setstate`
pub const STATUS_SUCCESS: &str = "success";

/// Some firmware answers an expired auth key with 511 instead of 401
pub const NETWORK_AUTHENTICATION_REQUIRED: u16 = 511;

/// Raw hub position of a fully open shade
pub const OPEN_VALUE: u16 = 65535;

/// Raw hub position of a fully closed shade
pub const CLOSED_VALUE: u16 = 0;

/// Normalized position of a fully open shade
pub const OPEN_PERCENT: u8 = 100;

/// Normalized position of a fully closed shade
pub const CLOSED_PERCENT: u8 = 0;

/// Endpoint of a single shade
#[must_use]
pub fn shade_path(id: u32) -> String {
    format!("{SHADES_PATH}/{id}")
}

/// Stop endpoint of a single shade
#[must_use]
pub fn stop_path(id: u32) -> String {
    format!("{SHADES_PATH}/{id}/stop")
}

/// Endpoint of a single device
#[must_use]
pub fn device_path(id: u32) -> String {
    format!("{DEVICES_PATH}/{id}")
}

/// Convert a raw hub position (0-65535) to a percentage (0-100)
///
/// Out-of-range input is clamped.
#[must_use]
pub fn position_to_percent(raw: i64) -> u8 {
    if raw <= i64::from(CLOSED_VALUE) {
        return CLOSED_PERCENT;
    }
    if raw >= i64::from(OPEN_VALUE) {
        return OPEN_PERCENT;
    }
    let open = i64::from(OPEN_VALUE);
    let percent = (raw * i64::from(OPEN_PERCENT) + open / 2) / open;
    u8::try_from(percent).unwrap_or(OPEN_PERCENT)
}

/// Convert a percentage (0-100) to a raw hub position (0-65535)
///
/// Values above 100 are clamped to fully open.
#[must_use]
pub fn percent_to_position(percent: u8) -> u16 {
    if percent == CLOSED_PERCENT {
        return CLOSED_VALUE;
    }
    if percent >= OPEN_PERCENT {
        return OPEN_VALUE;
    }
    let raw = (u32::from(percent) * u32::from(OPEN_VALUE) + 50) / u32::from(OPEN_PERCENT);
    u16::try_from(raw).unwrap_or(OPEN_VALUE)
}

/// Body of `GET /cws/api`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionResponse {
    /// API version string, absent on older firmware
    #[serde(default)]
    pub version: Option<String>,
}

/// Body of `GET /cws/api/login`
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    /// Session key for subsequent calls
    #[serde(default)]
    pub authkey: Option<String>,
}

fn default_shade_name() -> String {
    "Unknown".to_string()
}

fn default_online() -> String {
    "online".to_string()
}

fn default_sub_type() -> String {
    "Shade".to_string()
}

/// Shade record as the hub sends it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireShade {
    /// Hub-assigned id
    pub id: u32,
    /// Display name
    #[serde(default = "default_shade_name")]
    pub name: String,
    /// Raw position, 0-65535
    #[serde(default)]
    pub position: i64,
    /// "online" or "offline"
    #[serde(default = "default_online")]
    pub connection_status: String,
    /// Room id, 0 if unassigned
    #[serde(default)]
    pub room_id: u32,
    /// Device subtype
    #[serde(default = "default_sub_type")]
    pub sub_type: String,
}

impl WireShade {
    /// Normalize into a [`Shade`] with a placeholder room name
    #[must_use]
    pub fn into_shade(self) -> Shade {
        let room_name = default_room_name(self.room_id);

        Shade {
            id: self.id,
            name: self.name,
            position: position_to_percent(self.position),
            connection_status: ConnectionStatus::from(self.connection_status.as_str()),
            room_id: self.room_id,
            room_name,
            sub_type: self.sub_type,
        }
    }
}

/// Envelope of the shade endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShadesResponse {
    /// Listed shades
    #[serde(default)]
    pub shades: Vec<WireShade>,
}

/// Device record as the hub sends it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDevice {
    /// Hub-assigned id
    pub id: u32,
    /// Display name
    #[serde(default = "default_shade_name")]
    pub name: String,
    /// Device type
    #[serde(default, rename = "type")]
    pub device_type: String,
    /// Device subtype
    #[serde(default)]
    pub sub_type: String,
    /// "online" or "offline"
    #[serde(default = "default_online")]
    pub connection_status: String,
    /// Room id
    #[serde(default)]
    pub room_id: u32,
}

impl From<WireDevice> for Device {
    fn from(wire: WireDevice) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
            device_type: wire.device_type,
            sub_type: wire.sub_type,
            connection_status: ConnectionStatus::from(wire.connection_status.as_str()),
            room_id: wire.room_id,
        }
    }
}

/// Envelope of the device endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevicesResponse {
    /// Listed devices
    #[serde(default)]
    pub devices: Vec<WireDevice>,
}

/// Envelope of the room endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomsResponse {
    /// Listed rooms
    #[serde(default)]
    pub rooms: Vec<Room>,
}

/// Body of `POST /cws/api/shades/setstate`
#[derive(Debug, Serialize)]
pub struct SetStateRequest<'a> {
    /// Partial updates, one per shade
    pub shades: &'a [ShadeCommand],
}

/// Hub answer to `setstate`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStateResult {
    /// "success" when every update was accepted
    #[serde(default)]
    pub status: String,
    /// Human readable reason for a failure
    #[serde(default)]
    pub error_message: Option<String>,
    /// Devices the hub could not update
    #[serde(default)]
    pub error_devices: Vec<serde_json::Value>,
}

impl SetStateResult {
    /// Check if the hub accepted the batch
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}
