//! Cover entities backed by the coordinator snapshot.
//!
//! A [`ShadeEntity`] never talks to the hub for reads. Position, availability
//! and attributes all come from the coordinator's latest snapshot; commands
//! go through the coordinator so auth failures and optimistic updates are
//! handled in one place.

use async_trait::async_trait;
use serde::Serialize;
use std::{fmt, ops::BitOr, sync::Arc};

use crate::{
    coordinator::ShadeCoordinator,
    error::Result,
    protocol::OPEN_PERCENT,
    types::{ConnectionStatus, Shade},
};

/// Icon shown for a fully open shade
pub const ICON_OPEN: &str = "mdi:window-shutter-open";

/// Icon shown for any other position
pub const ICON_DEFAULT: &str = "mdi:window-shutter";

/// Capabilities a cover supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CoverFeatures(u8);

impl CoverFeatures {
    /// Can fully open
    pub const OPEN: Self = Self(1);
    /// Can fully close
    pub const CLOSE: Self = Self(1 << 1);
    /// Can move to an arbitrary position
    pub const SET_POSITION: Self = Self(1 << 2);
    /// Can halt while moving
    pub const STOP: Self = Self(1 << 3);

    /// No capabilities
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every capability
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::OPEN.0 | Self::CLOSE.0 | Self::SET_POSITION.0 | Self::STOP.0)
    }

    /// Check if every capability in `other` is supported
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bit value
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for CoverFeatures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A positionable cover device
#[async_trait]
pub trait Cover: Send + Sync {
    /// Supported capabilities
    fn supported_features(&self) -> CoverFeatures;

    /// Position from 0 (closed) to 100 (open), if known
    fn current_position(&self) -> Option<u8>;

    /// Whether the cover is fully closed, if known
    fn is_closed(&self) -> Option<bool> {
        self.current_position().map(|position| position == 0)
    }

    /// Fully open the cover
    async fn open_cover(&self) -> Result<()>;

    /// Fully close the cover
    async fn close_cover(&self) -> Result<()>;

    /// Halt the cover
    async fn stop_cover(&self) -> Result<()>;

    /// Move the cover to a position from 0 to 100
    async fn set_cover_position(&self, position: u8) -> Result<()>;
}

/// Extra state attributes of a shade entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShadeAttributes {
    /// Reachability reported by the hub
    pub connection_status: ConnectionStatus,
    /// Room id
    pub room_id: u32,
    /// Room display name
    pub room_name: String,
}

/// One shade exposed as a [`Cover`]
pub struct ShadeEntity {
    coordinator: Arc<ShadeCoordinator>,
    shade_id: u32,
    unique_id: String,
}

impl ShadeEntity {
    /// Bind a shade id to a coordinator
    #[must_use]
    pub fn new(coordinator: Arc<ShadeCoordinator>, shade_id: u32) -> Self {
        Self {
            coordinator,
            shade_id,
            unique_id: format!("crestron_shade_{shade_id}"),
        }
    }

    /// Hub id of the shade
    #[must_use]
    pub const fn shade_id(&self) -> u32 {
        self.shade_id
    }

    /// Stable id, `crestron_shade_{id}`
    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Shade record from the latest snapshot
    #[must_use]
    pub fn shade(&self) -> Option<Shade> {
        self.coordinator.shade(self.shade_id)
    }

    /// Hub name, or `Shade {id}` when the shade is unknown
    #[must_use]
    pub fn name(&self) -> String {
        self.shade()
            .map_or_else(|| format!("Shade {}", self.shade_id), |s| s.name)
    }

    /// Check if the entity state can be trusted
    ///
    /// Requires healthy coordinator data and a shade that is present and
    /// online.
    pub async fn is_available(&self) -> bool {
        self.coordinator.is_healthy().await && self.shade().is_some_and(|s| s.is_online())
    }

    /// Connection status and room of the shade
    #[must_use]
    pub fn extra_state_attributes(&self) -> Option<ShadeAttributes> {
        self.shade().map(|s| ShadeAttributes {
            connection_status: s.connection_status,
            room_id: s.room_id,
            room_name: s.room_name,
        })
    }

    /// Icon name for the current position
    #[must_use]
    pub fn icon(&self) -> &'static str {
        if self.current_position() == Some(OPEN_PERCENT) {
            ICON_OPEN
        } else {
            ICON_DEFAULT
        }
    }
}

impl fmt::Debug for ShadeEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadeEntity")
            .field("unique_id", &self.unique_id)
            .field("position", &self.current_position())
            .finish()
    }
}

#[async_trait]
impl Cover for ShadeEntity {
    fn supported_features(&self) -> CoverFeatures {
        CoverFeatures::all()
    }

    fn current_position(&self) -> Option<u8> {
        self.coordinator
            .snapshot()
            .get(self.shade_id)
            .map(|s| s.position)
    }

    async fn open_cover(&self) -> Result<()> {
        self.coordinator.open_shade(self.shade_id).await
    }

    async fn close_cover(&self) -> Result<()> {
        self.coordinator.close_shade(self.shade_id).await
    }

    async fn stop_cover(&self) -> Result<()> {
        self.coordinator.stop_shade(self.shade_id).await
    }

    async fn set_cover_position(&self, position: u8) -> Result<()> {
        self.coordinator
            .set_shade_position(self.shade_id, position)
            .await
    }
}
