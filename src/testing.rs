//! In-memory hub used by the coordinator and entity tests.

use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Mutex,
};

use crate::{
    client::ShadeApi,
    error::{CrestronError, Result},
    protocol::SetStateResult,
    types::{default_room_name, ConnectionStatus, HubConfig, Room, Shade, ShadeCommand},
};

/// How the next calls to the fake hub should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    None,
    Auth,
    Connection,
    Api,
}

impl Failure {
    fn to_error(self) -> Option<CrestronError> {
        match self {
            Self::None => None,
            Self::Auth => Some(CrestronError::Auth("token rejected".to_string())),
            Self::Connection => Some(CrestronError::Connection("hub unreachable".to_string())),
            Self::Api => Some(CrestronError::Api {
                status: Some(500),
                message: "internal error".to_string(),
            }),
        }
    }
}

pub struct FakeHub {
    pub shades: Mutex<Vec<Shade>>,
    pub rooms: Mutex<Vec<Room>>,
    pub commands: Mutex<Vec<ShadeCommand>>,
    pub stopped: Mutex<Vec<u32>>,
    pub tokens: Mutex<Vec<String>>,
    pub list_failure: Mutex<Failure>,
    pub rooms_failure: Mutex<Failure>,
    pub login_failure: Mutex<Failure>,
    pub command_failure: Mutex<Failure>,
    pub logins: AtomicU32,
    pub listings: AtomicU32,
    pub room_listings: AtomicU32,
}

impl FakeHub {
    pub fn with_shades(shades: Vec<Shade>) -> Self {
        Self {
            shades: Mutex::new(shades),
            rooms: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
            list_failure: Mutex::new(Failure::None),
            rooms_failure: Mutex::new(Failure::None),
            login_failure: Mutex::new(Failure::None),
            command_failure: Mutex::new(Failure::None),
            logins: AtomicU32::new(0),
            listings: AtomicU32::new(0),
            room_listings: AtomicU32::new(0),
        }
    }

    pub fn fail_listing(&self, failure: Failure) {
        *self.list_failure.lock().unwrap() = failure;
    }

    pub fn fail_commands(&self, failure: Failure) {
        *self.command_failure.lock().unwrap() = failure;
    }

    pub fn fail_login(&self, failure: Failure) {
        *self.login_failure.lock().unwrap() = failure;
    }

    pub fn fail_rooms(&self, failure: Failure) {
        *self.rooms_failure.lock().unwrap() = failure;
    }

    pub fn set_rooms(&self, rooms: Vec<Room>) {
        *self.rooms.lock().unwrap() = rooms;
    }

    pub fn remove_shade(&self, id: u32) {
        self.shades.lock().unwrap().retain(|s| s.id != id);
    }

    pub fn sent_commands(&self) -> Vec<ShadeCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShadeApi for FakeHub {
    fn host(&self) -> &str {
        "hub.local"
    }

    async fn login(&self) -> Result<String> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        match self.login_failure.lock().unwrap().to_error() {
            Some(e) => Err(e),
            None => Ok("fake-key".to_string()),
        }
    }

    async fn set_auth_token(&self, auth_token: String) {
        self.tokens.lock().unwrap().push(auth_token);
    }

    async fn list_shades(&self) -> Result<Vec<Shade>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.list_failure.lock().unwrap().to_error() {
            return Err(e);
        }
        Ok(self.shades.lock().unwrap().clone())
    }

    async fn list_rooms(&self) -> Result<Vec<Room>> {
        self.room_listings.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.rooms_failure.lock().unwrap().to_error() {
            return Err(e);
        }
        Ok(self.rooms.lock().unwrap().clone())
    }

    async fn set_shade_state(&self, commands: &[ShadeCommand]) -> Result<SetStateResult> {
        if let Some(e) = self.command_failure.lock().unwrap().to_error() {
            return Err(e);
        }
        self.commands.lock().unwrap().extend_from_slice(commands);
        Ok(SetStateResult {
            status: "success".to_string(),
            error_message: None,
            error_devices: Vec::new(),
        })
    }

    async fn stop_shade(&self, id: u32) -> Result<()> {
        if let Some(e) = self.command_failure.lock().unwrap().to_error() {
            return Err(e);
        }
        self.stopped.lock().unwrap().push(id);
        Ok(())
    }
}

pub fn shade(id: u32, position: u8) -> Shade {
    Shade {
        id,
        name: format!("Shade {id}"),
        position,
        connection_status: ConnectionStatus::Online,
        room_id: id,
        room_name: default_room_name(id),
        sub_type: "Shade".to_string(),
    }
}

/// Config with retries disabled so failure tests run instantly
pub fn test_config() -> HubConfig {
    let mut config = HubConfig::new("hub.local", "secret-token");
    config.timeouts.max_retry_attempts = 0;
    config.timeouts.retry_delay_ms = 1;
    config.scan_interval_secs = 1;
    config
}
