//! Caller-supplied deadlines.
//!
//! A [`Deadline`] is an absolute instant. Wrapping a future with
//! [`Deadline::run`] aborts it when the instant passes and surfaces
//! [`StoreError::Timeout`]. Because the instant is fixed, wrapping a whole
//! retry loop makes the budget cumulative across attempts.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};

use crate::error::{StoreError, StoreResult};

/// An absolute point in time by which an operation must finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// Deadline `ms` milliseconds from now.
    pub fn from_millis(ms: u64) -> Self {
        Self::after(Duration::from_millis(ms))
    }

    /// The instant the deadline expires.
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// The budget the deadline was created with.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time left before expiry (zero once expired).
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// The error reported when this deadline fires.
    pub fn timeout_error(&self) -> StoreError {
        StoreError::Timeout(self.budget.as_millis() as u64)
    }

    /// Run `fut` to completion or until the deadline passes.
    ///
    /// An already expired deadline fails without polling `fut`.
    pub async fn run<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        if self.is_expired() {
            return Err(self.timeout_error());
        }
        match timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        }
    }
}

/// Run `fut` under an optional deadline.
pub async fn with_deadline<T, F>(deadline: Option<&Deadline>, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match deadline {
        Some(deadline) => deadline.run(fut).await,
        None => fut.await,
    }
}
