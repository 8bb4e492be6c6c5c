//! Persistent session feeding.
//!
//! A [`PersistentFeed`] owns a started persistent session. Items are added
//! with [`PersistentFeed::add_paths`] and the session is closed with
//! [`PersistentFeed::lock`], which consumes the feed so nothing can be added
//! afterwards.

use std::time::Duration;

use protocol::PathEntry;
use protocol::wire::{Error, LockPersistentTransferRequest, TransferPathRequest};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::channel::Channel;
use crate::error::SessionError;
use crate::state::{Session, SessionState, TransferMode};

/// Handle for adding items to a persistent session.
pub struct PersistentFeed {
    channel: Channel,
    session: Session,
    batches: usize,
}

impl PersistentFeed {
    /// Wraps a started persistent session.
    pub fn new(channel: Channel, session: Session) -> Result<Self, SessionError> {
        if session.mode() != TransferMode::Persistent
            || session.state() != SessionState::Started
        {
            return Err(SessionError::InvalidState {
                operation: "feed persistent session",
                state: session.state(),
            });
        }
        Ok(Self {
            channel,
            session,
            batches: 0,
        })
    }

    /// Returns the session being fed.
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the number of batches accepted so far.
    pub const fn batches(&self) -> usize {
        self.batches
    }

    /// Enqueues `paths` into the running session.
    pub async fn add_paths(&mut self, paths: Vec<PathEntry>) -> Result<(), SessionError> {
        self.session.advance("add paths", SessionState::Feeding)?;
        let count = paths.len();
        let request = TransferPathRequest {
            transfer_id: self.session.transfer_id().to_owned(),
            transfer_path: paths.into_iter().map(Into::into).collect(),
        };
        let response = self
            .channel
            .add_transfer_paths(request)
            .await
            .map_err(|status| SessionError::rpc("AddTransferPaths", status))
            .inspect_err(|_| self.session.fail())?;
        if let Some(rejection) = rejection(response.error) {
            self.session.fail();
            return Err(rejection);
        }
        self.batches += 1;
        debug!(
            transfer_id = %self.session.transfer_id(),
            count,
            batch = self.batches,
            "paths added"
        );
        Ok(())
    }

    /// Declares that no more items will be added and returns the session.
    pub async fn lock(self) -> Result<Session, SessionError> {
        let Self {
            channel,
            mut session,
            batches,
        } = self;
        let request = LockPersistentTransferRequest {
            transfer_id: session.transfer_id().to_owned(),
        };
        let response = channel
            .lock_persistent_transfer(request)
            .await
            .map_err(|status| SessionError::rpc("LockPersistentTransfer", status))?;
        if let Some(rejection) = rejection(response.error) {
            session.fail();
            return Err(rejection);
        }
        info!(transfer_id = %session.transfer_id(), batches, "persistent session locked");
        Ok(session)
    }
}

fn rejection(error: Option<Error>) -> Option<SessionError> {
    error
        .filter(|e| e.code != 0 || !e.description.is_empty())
        .map(|e| SessionError::Rejected {
            code: e.code,
            description: e.description,
        })
}

/// Drives a [`PersistentFeed`] on a fixed schedule.
///
/// Every tick produces one batch; after `max_items` batches the session is
/// locked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeriodicFeeder {
    interval: Duration,
    max_items: usize,
}

impl PeriodicFeeder {
    /// Creates a feeder issuing `max_items` batches, one per `interval`.
    pub const fn new(interval: Duration, max_items: usize) -> Self {
        Self {
            interval,
            max_items,
        }
    }

    /// Returns the tick interval.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the number of batches issued before locking.
    pub const fn max_items(&self) -> usize {
        self.max_items
    }

    /// Feeds `produce(index)` for `index` in `0..max_items`, then locks.
    pub async fn run<F>(
        &self,
        mut feed: PersistentFeed,
        mut produce: F,
    ) -> Result<Session, SessionError>
    where
        F: FnMut(usize) -> Vec<PathEntry> + Send,
    {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval.max(Duration::from_millis(1)),
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        for index in 0..self.max_items {
            ticker.tick().await;
            feed.add_paths(produce(index)).await?;
        }
        feed.lock().await
    }
}
