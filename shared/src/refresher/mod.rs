//! # Refresher
//!
//! Keeps the flag/segment/target repositories aligned with upstream via a
//! small STREAMING/POLLING/STOPPED state machine (§4.3). The stream is
//! preferred; the Refresher falls back to polling when streaming is
//! disabled, the handshake fails, or the stream goes quiet for longer than
//! twice the heartbeat interval.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{EntityKind, EnvironmentId, StreamEvent};
use crate::errors::ProxyResult;
use crate::repository::{FlagRepository, SegmentRepository, TargetRepository};
use crate::retry::with_backoff;
use crate::token_registry::TokenRegistry;
use crate::upstream::UpstreamClient;

/// The Refresher's externally observable state (§4.3's state table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefresherState {
    Init,
    Streaming,
    Polling,
    Stopped,
}

pub struct Refresher {
    environment: EnvironmentId,
    api_key: String,
    upstream: UpstreamClient,
    flags: FlagRepository,
    segments: SegmentRepository,
    targets: TargetRepository,
    tokens: TokenRegistry,
    state: RwLock<RefresherState>,
    stream_enabled: bool,
    flag_poll_interval: Duration,
    target_poll_interval: Duration,
    heartbeat_interval: Duration,
}

impl Refresher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        environment: EnvironmentId,
        api_key: String,
        upstream: UpstreamClient,
        flags: FlagRepository,
        segments: SegmentRepository,
        targets: TargetRepository,
        tokens: TokenRegistry,
        stream_enabled: bool,
        flag_poll_interval: Duration,
        target_poll_interval: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            environment,
            api_key,
            upstream,
            flags,
            segments,
            targets,
            tokens,
            state: RwLock::new(RefresherState::Init),
            stream_enabled,
            flag_poll_interval,
            target_poll_interval,
            heartbeat_interval,
        }
    }

    pub async fn state(&self) -> RefresherState {
        *self.state.read().await
    }

    async fn set_state(&self, new_state: RefresherState) {
        let mut state = self.state.write().await;
        if *state != new_state {
            info!(environment = %self.environment, from = ?*state, to = ?new_state, "refresher state transition");
        }
        *state = new_state;
    }

    /// Authenticates against upstream and stores the resulting token in the
    /// Token registry, then runs the stream/poll/target-poll loops until
    /// `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        if let Err(err) = self.authenticate().await {
            warn!(environment = %self.environment, error = %err, "initial upstream authentication failed");
        }

        let main_loop = self.run_flag_loop(shutdown.clone());
        let target_loop = self.run_target_poll_loop(shutdown.clone());

        tokio::join!(main_loop, target_loop);
        self.set_state(RefresherState::Stopped).await;
    }

    async fn authenticate(&self) -> ProxyResult<()> {
        let token = self.upstream.authenticate(&self.api_key).await?;
        self.tokens.set(&self.environment, token).await;
        Ok(())
    }

    /// STREAMING/POLLING arbitration loop (§4.3's transition table).
    async fn run_flag_loop(&self, shutdown: CancellationToken) {
        if !self.stream_enabled {
            self.set_state(RefresherState::Polling).await;
            self.poll_loop(shutdown).await;
            return;
        }

        loop {
            if shutdown.is_cancelled() {
                return;
            }

            match self.stream_once(shutdown.clone()).await {
                StreamOutcome::ShutDown => return,
                StreamOutcome::Disconnected => {
                    self.set_state(RefresherState::Polling).await;
                    if self.poll_until_stream_retry(shutdown.clone()).await == PollOutcome::ShutDown {
                        return;
                    }
                }
            }
        }
    }

    /// Connects the stream and applies events until it goes quiet for
    /// `2 × heartbeat_interval`, the handshake fails, or shutdown fires.
    async fn stream_once(&self, shutdown: CancellationToken) -> StreamOutcome {
        let idle_timeout = self.heartbeat_interval * 2;

        let mut stream = match self.upstream.open_stream(&self.environment).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(environment = %self.environment, error = %err, "stream handshake failed, falling back to polling");
                return StreamOutcome::Disconnected;
            }
        };

        self.set_state(RefresherState::Streaming).await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return StreamOutcome::ShutDown,
                next = tokio::time::timeout(idle_timeout, stream.next()) => {
                    match next {
                        Ok(Some(Ok(event))) => self.apply_event(event).await,
                        Ok(Some(Err(err))) => {
                            warn!(environment = %self.environment, error = %err, "stream event error");
                        }
                        Ok(None) => {
                            debug!(environment = %self.environment, "stream closed by upstream");
                            return StreamOutcome::Disconnected;
                        }
                        Err(_) => {
                            debug!(environment = %self.environment, "stream silent for 2x heartbeat interval");
                            return StreamOutcome::Disconnected;
                        }
                    }
                }
            }
        }
    }

    /// Polls immediately, then every `flag_poll_interval`, attempting a
    /// stream reconnect probe between ticks. Returns once the stream is
    /// healthy again (caller re-enters STREAMING) or on shutdown.
    async fn poll_until_stream_retry(&self, shutdown: CancellationToken) -> PollOutcome {
        self.poll_once().await;

        let mut ticker = tokio::time::interval(self.flag_poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return PollOutcome::ShutDown,
                _ = ticker.tick() => {
                    self.poll_once().await;
                    if self.upstream.open_stream(&self.environment).await.is_ok() {
                        return PollOutcome::StreamHealthy;
                    }
                }
            }
        }
    }

    async fn poll_loop(&self, shutdown: CancellationToken) {
        self.poll_once().await;
        let mut ticker = tokio::time::interval(self.flag_poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => self.poll_once().await,
            }
        }
    }

    /// A bulk fetch-and-replace; failures are logged and the previous
    /// cached set remains authoritative (§4.3).
    async fn poll_once(&self) {
        let timeout = self.flag_poll_interval.min(Duration::from_secs(30));

        match self.upstream.bulk_fetch_flags(&self.environment, timeout).await {
            Ok(flags) => {
                if let Err(err) = self.flags.setup(&self.environment, flags).await {
                    warn!(environment = %self.environment, error = %err, "failed to apply polled flags");
                }
            }
            Err(err) => warn!(environment = %self.environment, error = %err, "flag poll failed"),
        }

        match self.upstream.bulk_fetch_segments(&self.environment, timeout).await {
            Ok(segments) => {
                if let Err(err) = self.segments.setup(&self.environment, segments).await {
                    warn!(environment = %self.environment, error = %err, "failed to apply polled segments");
                }
            }
            Err(err) => warn!(environment = %self.environment, error = %err, "segment poll failed"),
        }
    }

    async fn run_target_poll_loop(&self, shutdown: CancellationToken) {
        if self.target_poll_interval.is_zero() {
            return;
        }

        let mut ticker = tokio::time::interval(self.target_poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    let timeout = self.target_poll_interval.min(Duration::from_secs(30));
                    match self.upstream.bulk_fetch_targets(&self.environment, timeout).await {
                        Ok(targets) => {
                            if let Err(err) = self.targets.setup(&self.environment, targets).await {
                                warn!(environment = %self.environment, error = %err, "failed to apply polled targets");
                            }
                        }
                        Err(err) => warn!(environment = %self.environment, error = %err, "target poll failed"),
                    }
                }
            }
        }
    }

    /// Re-fetches the canonical entity for `event` and applies it, retrying
    /// transient failures with backoff before giving up and dropping the
    /// event (§4.3's failure policy).
    async fn apply_event(&self, event: StreamEvent) {
        let env = event.environment.clone();
        let result: ProxyResult<()> = with_backoff("apply_event", || {
            let env = env.clone();
            let event = event.clone();
            async move { self.apply_event_once(&env, &event).await }
        })
        .await;

        if let Err(err) = result {
            warn!(environment = %env, entity_id = %event.entity_id, error = %err, "dropping stream event after retries exhausted");
        }
    }

    async fn apply_event_once(&self, env: &str, event: &StreamEvent) -> ProxyResult<()> {
        if event.deleted {
            return match event.kind {
                EntityKind::Flag => self.flags.remove(env, &event.entity_id).await,
                EntityKind::Segment => self.segments.remove(env, &event.entity_id).await,
                EntityKind::Target => self.targets.remove(env, &event.entity_id).await,
            };
        }

        match event.kind {
            EntityKind::Flag => {
                let flag = self.upstream.fetch_flag(env, &event.entity_id).await?;
                self.flags.add(env, flag).await
            }
            EntityKind::Segment => {
                let segment = self.upstream.fetch_segment(env, &event.entity_id).await?;
                self.segments.add(env, segment).await
            }
            EntityKind::Target => {
                let target = self.upstream.fetch_target(env, &event.entity_id).await?;
                self.targets.add(env, target).await
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum StreamOutcome {
    Disconnected,
    ShutDown,
}

#[derive(Debug, PartialEq, Eq)]
enum PollOutcome {
    StreamHealthy,
    ShutDown,
}

impl std::fmt::Debug for Refresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refresher").field("environment", &self.environment).finish_non_exhaustive()
    }
}
