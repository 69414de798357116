//! Network attach procedure.
//!
//! [`NetworkLink`] owns the station interface.  Nothing else in the firmware
//! holds a handle to it, so the attach state it reports is authoritative.

use core::time::Duration;

use log::{info, warn};

use super::credentials::Credentials;
use super::ports::{ClockPort, LinkError, StationPort};

/// Attach state as seen by the link owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Attaching,
    Attached,
}

/// Bounded-retry attach policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachPolicy {
    /// Link-state polls before giving up.
    pub max_attempts: u8,
    /// Sleep between two polls.
    pub poll_interval: Duration,
}

impl AttachPolicy {
    pub fn from_config(config: &crate::config::DeviceConfig) -> Self {
        Self {
            max_attempts: config.attach_max_attempts,
            poll_interval: Duration::from_millis(config.attach_poll_interval_ms as u64),
        }
    }
}

impl Default for AttachPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            poll_interval: Duration::from_secs(1),
        }
    }
}

pub struct NetworkLink<W: StationPort> {
    station: W,
    policy: AttachPolicy,
    state: LinkState,
}

impl<W: StationPort> NetworkLink<W> {
    pub fn new(station: W, policy: AttachPolicy) -> Self {
        Self {
            station,
            policy,
            state: LinkState::Disconnected,
        }
    }

    /// Issue one connect request, then poll until the link is up or the
    /// poll budget is spent.
    ///
    /// Polls are separated by `poll_interval`; there is no sleep after the
    /// final poll, so a failed attach costs `(max_attempts - 1)` intervals.
    pub async fn attach(
        &mut self,
        credentials: &Credentials,
        clock: &mut impl ClockPort,
    ) -> Result<(), LinkError> {
        info!("Link: attaching to '{}'", credentials.network_id());
        self.state = LinkState::Attaching;

        if let Err(e) = self.station.begin_connect(credentials) {
            warn!("Link: connect request rejected ({})", e);
            self.state = LinkState::Disconnected;
            return Err(e);
        }

        let attempts = self.policy.max_attempts;
        for attempt in 1..=attempts {
            if self.station.is_connected() {
                info!("Link: attached after {} poll(s)", attempt);
                self.state = LinkState::Attached;
                return Ok(());
            }
            if attempt < attempts {
                clock.sleep(self.policy.poll_interval).await;
            }
        }

        warn!("Link: not attached after {} polls", attempts);
        self.station.disconnect();
        self.state = LinkState::Disconnected;
        Err(LinkError::AttachTimeout { attempts })
    }

    /// Live check against the driver.  A dropped link is noticed here and
    /// the cached state follows.
    pub fn is_attached(&mut self) -> bool {
        let up = self.station.is_connected();
        if !up && self.state == LinkState::Attached {
            warn!("Link: attachment lost");
            self.state = LinkState::Disconnected;
        }
        up
    }

    pub fn detach(&mut self) {
        self.station.disconnect();
        if self.state != LinkState::Disconnected {
            info!("Link: detached");
        }
        self.state = LinkState::Disconnected;
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn station(&self) -> &W {
        &self.station
    }

    pub fn station_mut(&mut self) -> &mut W {
        &mut self.station
    }
}
