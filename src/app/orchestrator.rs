//! Device orchestrator: the connection lifecycle state machine.
//!
//! ```text
//!            ┌──────────────── manual reset (any state) ───────────────┐
//!            ▼                                                         │
//!   ┌───────────────┐ capture+persist ┌───────────┐  link up  ┌──────────┐
//!   │ NoCredentials │────────────────▶│ Attaching │──────────▶│ Attached │
//!   └───────────────┘                 └───────────┘           └──────────┘
//!                                        ▲     │ fail              │ open
//!                                        │     ▼                   ▼
//!                                        │  cooldown       ┌───────────────┐
//!                                        └─────────────────│ SessionActive │
//!                                           link lost      └───────────────┘
//! ```
//!
//! One call to [`DeviceOrchestrator::run_cycle`] evaluates the rules in
//! priority order: manual reset, already attached, provision, re-attach.
//! An opened upstream session is the terminal activity of its cycle; the
//! cycle returns only after the receive loop ends.

use core::convert::Infallible;
use core::time::Duration;

use log::{debug, error, info, warn};

use super::credentials::{CredentialStore, Credentials, SessionToken};
use super::events::AppEvent;
use super::link::{AttachPolicy, NetworkLink};
use super::ports::{
    ClockPort, EventSink, LinkError, ProvisioningError, ProvisioningPort, ResetPort,
    StationPort, StoragePort, UpstreamTransport,
};
use super::provisioning::{ProvisioningChannel, ProvisioningSession, ProvisioningStatus};
use super::session::{SessionEnd, UpstreamSession};
use crate::config::DeviceConfig;
use crate::error::Result;

/// Conceptual lifecycle state, tracked for logging and observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing stored; the provisioning channel is (or will be) active.
    NoCredentials,
    /// Credentials stored, link not up yet.
    Attaching,
    /// Link up, no upstream session.
    Attached,
    /// Receive loop running.
    SessionActive,
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Reset button handled; credentials wiped, link dropped.
    ManualReset,
    /// Link was already up; nothing to do.
    AlreadyAttached,
    /// Fresh credentials captured, persisted and attached.  Carries the
    /// result of the session that followed, if it could be opened.
    Provisioned { session: Option<SessionEnd> },
    /// Fresh credentials captured and persisted, but attach failed.
    ProvisionedAttachFailed,
    /// Stored credentials attached.  Carries the session result when
    /// re-authentication is enabled and a token was cached.
    Reattached { session: Option<SessionEnd> },
    /// Stored credentials did not attach; the cooldown has elapsed.
    ReattachFailed,
}

fn transition(state: &mut LifecycleState, to: LifecycleState, sink: &mut impl EventSink) {
    if *state == to {
        return;
    }
    let from = *state;
    info!("Lifecycle transition: {:?} -> {:?}", from, to);
    *state = to;
    sink.emit(&AppEvent::StateChanged { from, to });
}

fn attach_failed_event(error: LinkError, sink: &mut impl EventSink) {
    match error {
        LinkError::AttachTimeout { attempts } => sink.emit(&AppEvent::AttachFailed { attempts }),
        LinkError::Driver(_) => sink.emit(&AppEvent::AttachFailed { attempts: 0 }),
    }
}

fn notify<P: ProvisioningPort>(
    session: &mut ProvisioningSession<'_, P>,
    status: ProvisioningStatus,
    sink: &mut impl EventSink,
) {
    if session.notify_status(status) {
        sink.emit(&AppEvent::StatusNotified(status));
    } else {
        sink.emit(&AppEvent::StatusNotDelivered(status));
    }
}

pub struct DeviceOrchestrator<S, W, P, T, R>
where
    S: StoragePort,
    W: StationPort,
    P: ProvisioningPort,
    T: UpstreamTransport,
    R: ResetPort,
{
    config: DeviceConfig,
    store: CredentialStore<S>,
    link: NetworkLink<W>,
    channel: ProvisioningChannel<P>,
    transport: T,
    reset: R,
    state: LifecycleState,
    /// Token from the most recent provisioning.  RAM only.
    cached_token: Option<SessionToken>,
    cycles: u32,
}

impl<S, W, P, T, R> DeviceOrchestrator<S, W, P, T, R>
where
    S: StoragePort,
    W: StationPort,
    P: ProvisioningPort,
    T: UpstreamTransport,
    R: ResetPort,
{
    pub fn new(
        config: DeviceConfig,
        storage: S,
        station: W,
        provisioning: P,
        transport: T,
        reset: R,
    ) -> Self {
        let link = NetworkLink::new(station, AttachPolicy::from_config(&config));
        let channel = ProvisioningChannel::new(provisioning, &config.device_name);
        Self {
            store: CredentialStore::new(storage),
            link,
            channel,
            transport,
            reset,
            state: LifecycleState::NoCredentials,
            cached_token: None,
            cycles: 0,
            config,
        }
    }

    /// Startup housekeeping, run once before the first cycle.
    pub fn boot(&mut self, sink: &mut impl EventSink) {
        info!(
            "Orchestrator: boot (device '{}', endpoint {})",
            self.config.device_name, self.config.server_endpoint
        );
        let mut wiped = false;
        if self.config.wipe_credentials_on_boot {
            match self.store.clear() {
                Ok(()) => wiped = true,
                Err(e) => warn!("Orchestrator: boot-time credential wipe failed ({})", e),
            }
        }
        self.state = if self.store.load().is_some() {
            LifecycleState::Attaching
        } else {
            LifecycleState::NoCredentials
        };
        sink.emit(&AppEvent::Booted {
            credentials_wiped: wiped,
        });
    }

    /// Run forever: boot, then one cycle per `cycle_interval`.
    pub async fn run(
        mut self,
        clock: &mut impl ClockPort,
        sink: &mut impl EventSink,
    ) -> Infallible {
        self.boot(sink);
        let interval = Duration::from_millis(self.config.cycle_interval_ms as u64);
        loop {
            clock.sleep(interval).await;
            match self.run_cycle(clock, sink).await {
                Ok(outcome) => debug!("Orchestrator: cycle {} -> {:?}", self.cycles, outcome),
                Err(e) => warn!("Orchestrator: cycle {} failed ({}), retrying", self.cycles, e),
            }
        }
    }

    /// Evaluate the lifecycle rules once.
    pub async fn run_cycle(
        &mut self,
        clock: &mut impl ClockPort,
        sink: &mut impl EventSink,
    ) -> Result<CycleOutcome> {
        self.cycles = self.cycles.wrapping_add(1);

        if self.reset.reset_requested() {
            self.handle_manual_reset(sink);
            return Ok(CycleOutcome::ManualReset);
        }

        if self.link.is_attached() {
            transition(&mut self.state, LifecycleState::Attached, sink);
            return Ok(CycleOutcome::AlreadyAttached);
        }

        match self.store.load() {
            None => self.provision(clock, sink).await,
            Some(credentials) => Ok(self.reattach(&credentials, clock, sink).await),
        }
    }

    fn handle_manual_reset(&mut self, sink: &mut impl EventSink) {
        warn!("Orchestrator: manual reset requested");
        if let Err(e) = self.store.clear() {
            error!("Orchestrator: credential wipe failed ({})", e);
        }
        self.cached_token = None;
        self.link.detach();
        transition(&mut self.state, LifecycleState::NoCredentials, sink);
        sink.emit(&AppEvent::ManualReset);
    }

    async fn provision(
        &mut self,
        clock: &mut impl ClockPort,
        sink: &mut impl EventSink,
    ) -> Result<CycleOutcome> {
        transition(&mut self.state, LifecycleState::NoCredentials, sink);

        let (mut session, credentials, token) = loop {
            let mut session = self.channel.activate().await?;
            sink.emit(&AppEvent::PeerConnected);
            match session.await_credential_write().await {
                Ok((credentials, token)) => break (session, credentials, token),
                Err(ProvisioningError::Incomplete) => {
                    sink.emit(&AppEvent::ProvisioningAbandoned);
                    info!("Orchestrator: re-advertising after incomplete provisioning");
                }
                Err(e) => return Err(e.into()),
            }
        };

        // Persist before attaching so a crash mid-attach keeps the credentials.
        if let Err(e) = self.store.save(&credentials) {
            error!("Orchestrator: persisting credentials failed ({})", e);
            notify(&mut session, ProvisioningStatus::Failed, sink);
            session.await_disconnect().await;
            return Err(e.into());
        }
        sink.emit(&AppEvent::CredentialsCaptured);

        notify(&mut session, ProvisioningStatus::Starting, sink);
        transition(&mut self.state, LifecycleState::Attaching, sink);

        if let Err(e) = self.link.attach(&credentials, clock).await {
            warn!("Orchestrator: attach after provisioning failed ({})", e);
            attach_failed_event(e, sink);
            notify(&mut session, ProvisioningStatus::Failed, sink);
            session.await_disconnect().await;
            return Ok(CycleOutcome::ProvisionedAttachFailed);
        }

        notify(&mut session, ProvisioningStatus::Connected, sink);
        drop(session);
        transition(&mut self.state, LifecycleState::Attached, sink);

        self.cached_token = Some(token.clone());
        let session = self.run_session(&token, clock, sink).await;
        Ok(CycleOutcome::Provisioned { session })
    }

    async fn reattach(
        &mut self,
        credentials: &Credentials,
        clock: &mut impl ClockPort,
        sink: &mut impl EventSink,
    ) -> CycleOutcome {
        transition(&mut self.state, LifecycleState::Attaching, sink);

        match self.link.attach(credentials, clock).await {
            Ok(()) => {
                transition(&mut self.state, LifecycleState::Attached, sink);
                if !self.config.reauthenticate_on_reattach {
                    return CycleOutcome::Reattached { session: None };
                }
                let Some(token) = self.cached_token.clone() else {
                    info!("Orchestrator: no cached token, staying attached without a session");
                    return CycleOutcome::Reattached { session: None };
                };
                let session = self.run_session(&token, clock, sink).await;
                CycleOutcome::Reattached { session }
            }
            Err(e) => {
                attach_failed_event(e, sink);
                let cooldown = Duration::from_secs(self.config.reattach_cooldown_secs as u64);
                warn!(
                    "Orchestrator: re-attach failed ({}), cooling down {}s",
                    e,
                    cooldown.as_secs()
                );
                clock.sleep(cooldown).await;
                CycleOutcome::ReattachFailed
            }
        }
    }

    /// Open the upstream session and run its receive loop to completion.
    /// Returns `None` if the connection could not be opened.
    async fn run_session(
        &mut self,
        token: &SessionToken,
        clock: &mut impl ClockPort,
        sink: &mut impl EventSink,
    ) -> Option<SessionEnd> {
        let throttle = Duration::from_millis(self.config.receive_throttle_ms as u64);
        let session = match UpstreamSession::open(
            &mut self.transport,
            &self.config.server_endpoint,
            token,
            throttle,
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!("Orchestrator: upstream session failed to open ({})", e);
                return None;
            }
        };

        transition(&mut self.state, LifecycleState::SessionActive, sink);
        sink.emit(&AppEvent::SessionOpened);

        let end = session
            .listen(clock, |text| {
                sink.emit(&AppEvent::MessageReceived(text.into()));
            })
            .await;

        sink.emit(&AppEvent::SessionClosed {
            messages: end.messages,
        });
        let next = if self.link.is_attached() {
            LifecycleState::Attached
        } else {
            LifecycleState::Attaching
        };
        transition(&mut self.state, next, sink);
        Some(end)
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn store(&self) -> &CredentialStore<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut CredentialStore<S> {
        &mut self.store
    }

    pub fn link(&self) -> &NetworkLink<W> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut NetworkLink<W> {
        &mut self.link
    }

    pub fn provisioning(&self) -> &P {
        self.channel.port()
    }

    pub fn provisioning_mut(&mut self) -> &mut P {
        self.channel.port_mut()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn reset_input_mut(&mut self) -> &mut R {
        &mut self.reset
    }

    pub fn has_cached_token(&self) -> bool {
        self.cached_token.is_some()
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }
}
