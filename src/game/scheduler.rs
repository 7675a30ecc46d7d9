//! Per-connection tick loop
//!
//! The socket reader owns a [`GameDriver`]. Input frames and the pause flag
//! are handed to the running tick task through [`Controls`]; the task owns
//! the [`GameSession`] until it finishes or is cancelled, at which point the
//! driver takes it back.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::ws::protocol::ServerMsg;

use super::paddle::KeyFrame;
use super::session::{GameSession, SessionError};
use super::Side;

/// Tick loop pacing
#[derive(Debug, Clone, Copy)]
pub struct TickTiming {
    pub tick_interval: Duration,
    /// How often a paused loop wakes up to check the flag
    pub pause_poll: Duration,
}

impl TickTiming {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick_interval: config.tick_interval,
            pause_poll: config.pause_poll,
        }
    }
}

impl Default for TickTiming {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(6),
            pause_poll: Duration::from_millis(100),
        }
    }
}

/// Reader-to-tick-loop hand-off. Only the newest key frame is kept.
#[derive(Debug, Default)]
struct Controls {
    latest: Mutex<Option<KeyFrame>>,
    paused: AtomicBool,
}

impl Controls {
    fn buffer(&self, frame: KeyFrame) {
        *self.latest.lock() = Some(frame);
    }

    fn take(&self) -> Option<KeyFrame> {
        self.latest.lock().take()
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

enum Slot {
    /// Waiting for "start"; also where a finished bracket match rests
    Idle(GameSession),
    Running(JoinHandle<Result<GameSession, SessionError>>),
    /// The task died with a fatal error; nothing left to persist
    Failed,
}

struct TickLoop {
    session: GameSession,
    controls: Arc<Controls>,
    events: mpsc::Sender<ServerMsg>,
    cancel: watch::Receiver<bool>,
    timing: TickTiming,
}

impl TickLoop {
    /// Tick until the match ends, the client goes away or the loop is
    /// cancelled. Cancellation is only observed between ticks.
    async fn run(mut self) -> Result<GameSession, SessionError> {
        let user_id = self.session.data().user_id;
        let mut interval = time::interval(self.timing.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(
            user_id,
            round = self.session.data().game_round(),
            "Tick loop started"
        );

        loop {
            if *self.cancel.borrow() {
                debug!(user_id, "Tick loop cancelled");
                break;
            }

            if self.controls.is_paused() {
                tokio::select! {
                    _ = time::sleep(self.timing.pause_poll) => {}
                    changed = self.cancel.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }

            tokio::select! {
                _ = interval.tick() => {}
                changed = self.cancel.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            if let Some(frame) = self.controls.take() {
                self.session.apply_input(&frame);
            }

            let report = self.session.tick();
            for event in report.events {
                if self.events.send(event).await.is_err() {
                    debug!(user_id, "Event channel closed, stopping tick loop");
                    return Ok(self.session);
                }
            }

            if let Some(winner) = report.winner {
                self.finish_match(winner).await?;
                break;
            }
        }

        Ok(self.session)
    }

    async fn finish_match(&mut self, winner: Side) -> Result<(), SessionError> {
        match self.session.on_match_ended(winner).await {
            Ok(status) => {
                debug!(user_id = self.session.data().user_id, status = ?status, "Match settled");
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!(
                    user_id = self.session.data().user_id,
                    error = %e,
                    "Failed to persist match result"
                );
                let _ = self
                    .events
                    .send(ServerMsg::error("persistence_failed", e.to_string()))
                    .await;
            }
        }

        let _ = self.events.send(ServerMsg::GameEnd).await;
        Ok(())
    }
}

/// Owns one connection's session and its tick task
pub struct GameDriver {
    slot: Slot,
    controls: Arc<Controls>,
    events: mpsc::Sender<ServerMsg>,
    cancel: watch::Sender<bool>,
    timing: TickTiming,
    failed: Arc<Notify>,
}

impl GameDriver {
    pub fn new(
        session: GameSession,
        events: mpsc::Sender<ServerMsg>,
        timing: TickTiming,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            slot: Slot::Idle(session),
            controls: Arc::new(Controls::default()),
            events,
            cancel,
            timing,
            failed: Arc::new(Notify::new()),
        }
    }

    /// Fires once if the tick task dies with a fatal error or a panic
    pub fn failure_signal(&self) -> Arc<Notify> {
        self.failed.clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(&self.slot, Slot::Running(handle) if !handle.is_finished())
    }

    /// Start the tick loop. A start while running, after a fatal error or on
    /// a completed session is ignored. A start after a finished bracket
    /// match plays the next one.
    pub async fn start(&mut self) {
        let session = match std::mem::replace(&mut self.slot, Slot::Failed) {
            Slot::Idle(session) => session,
            Slot::Running(handle) if !handle.is_finished() => {
                debug!("Tick loop already running, ignoring start");
                self.slot = Slot::Running(handle);
                return;
            }
            Slot::Running(handle) => match handle.await {
                Ok(Ok(session)) => session,
                Ok(Err(_)) => return,
                Err(e) => {
                    error!(error = %e, "Tick task panicked");
                    return;
                }
            },
            Slot::Failed => {
                warn!("Session failed, ignoring start");
                return;
            }
        };

        let mut session = session;
        if !session.begin_next_match() {
            debug!(user_id = session.data().user_id, "Session complete, ignoring start");
            self.slot = Slot::Idle(session);
            return;
        }

        self.spawn(session);
    }

    fn spawn(&mut self, session: GameSession) {
        let user_id = session.data().user_id;
        let tick_loop = TickLoop {
            session,
            controls: self.controls.clone(),
            events: self.events.clone(),
            cancel: self.cancel.subscribe(),
            timing: self.timing,
        };
        let events = self.events.clone();
        let failed = self.failed.clone();

        let handle = tokio::spawn(async move {
            let result = AssertUnwindSafe(tick_loop.run())
                .catch_unwind()
                .await
                .unwrap_or(Err(SessionError::TaskPanicked));
            if let Err(e) = &result {
                error!(user_id, error = %e, "Session failed");
                let _ = events
                    .send(ServerMsg::error("session_failed", e.to_string()))
                    .await;
                failed.notify_one();
            }
            result
        });

        self.slot = Slot::Running(handle);
    }

    pub fn pause(&self) {
        self.controls.set_paused(true);
    }

    pub fn resume(&self) {
        self.controls.set_paused(false);
    }

    /// Replace any not-yet-applied frame
    pub fn buffer_input(&self, frame: KeyFrame) {
        self.controls.buffer(frame);
    }

    /// Cancel the tick task, then save the snapshot unless the session is
    /// complete
    pub async fn shutdown(self) {
        self.cancel.send_replace(true);

        let session = match self.slot {
            Slot::Idle(session) => session,
            Slot::Running(handle) => match handle.await {
                Ok(Ok(session)) => session,
                Ok(Err(_)) => return,
                Err(e) => {
                    error!(error = %e, "Tick task panicked, snapshot not saved");
                    return;
                }
            },
            Slot::Failed => return,
        };

        if let Err(e) = session.persist_snapshot().await {
            error!(
                user_id = session.data().user_id,
                error = %e,
                "Failed to save session snapshot on disconnect"
            );
            return;
        }
        info!(user_id = session.data().user_id, "Session closed");
    }
}
