//! Per-call cancellation and deadline.
//!
//! `CallContext` is what every suspending operation receives: a
//! `CancellationToken` the caller can trip and an optional absolute
//! deadline. Sub-operations derive tighter deadlines with
//! [`CallContext::sub_deadline`] but never looser ones.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Bind an externally owned cancellation token.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Tighten the deadline; an earlier existing deadline wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once the token is cancelled or the deadline has passed.
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with `Error::Cancelled` if the call is already done.
    ///
    /// Checked before every external-call boundary.
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.is_done() {
            return Err(Error::cancelled(stage));
        }
        Ok(())
    }

    /// Time left until the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Deadline for a sub-operation bounded by `limit`.
    ///
    /// The result is `now + limit`, clamped to the overall deadline.
    pub fn sub_deadline(&self, limit: Duration) -> Instant {
        let own = Instant::now() + limit;
        match self.deadline {
            Some(overall) => own.min(overall),
            None => own,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_never_done() {
        let ctx = CallContext::background();
        assert!(!ctx.is_done());
        assert!(ctx.remaining().is_none());
        assert!(ctx.check("anything").is_ok());
    }

    #[test]
    fn cancelled_token_fails_check() {
        let token = CancellationToken::new();
        let ctx = CallContext::background().with_cancel(token.clone());
        token.cancel();
        let err = ctx.check("inference query").unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_is_done() {
        let ctx = CallContext::with_timeout(Duration::from_millis(50));
        assert!(!ctx.is_done());
        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(ctx.is_done());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn sub_deadline_never_exceeds_overall() {
        let ctx = CallContext::with_timeout(Duration::from_millis(100));
        let overall = ctx.deadline().unwrap();
        assert_eq!(ctx.sub_deadline(Duration::from_secs(10)), overall);
        assert!(ctx.sub_deadline(Duration::from_millis(10)) < overall);
    }

    #[test]
    fn with_deadline_keeps_earlier() {
        let now = Instant::now();
        let ctx = CallContext::background()
            .with_deadline(now + Duration::from_secs(5))
            .with_deadline(now + Duration::from_secs(50));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(5)));
    }
}
