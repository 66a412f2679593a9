use super::ledger::UsageLedger;
use super::types::{CallType, ClientId, QuotaUsage};
use crate::error::{EnhancerError, StorageError};
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Arc;

/// Calls allowed per client inside one rolling window.
pub const DAILY_CALL_LIMIT: u32 = 25;
/// Length of the rolling window.
pub const QUOTA_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied,
}

impl Admission {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Rolling-window admission policy over a [`UsageLedger`].
///
/// Every call inside the trailing window weighs the same. A client sitting
/// at the limit becomes eligible again the moment its oldest qualifying call
/// ages out.
///
/// `admit` followed by `record` is not transactional: two concurrent
/// requests from one client can both observe `limit - 1` and both pass.
pub struct RateLimiter {
    ledger: Arc<dyn UsageLedger>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(ledger: Arc<dyn UsageLedger>) -> Self {
        Self {
            ledger,
            limit: DAILY_CALL_LIMIT,
            window: Duration::hours(QUOTA_WINDOW_HOURS),
        }
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    pub async fn admit(
        &self,
        client: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<Admission, StorageError> {
        let used = self.ledger.count_since(client, self.cutoff(now)).await?;
        if used >= u64::from(self.limit) {
            tracing::warn!(client = %client, used, limit = self.limit, "daily quota exhausted");
            return Ok(Admission::Denied);
        }
        Ok(Admission::Allowed)
    }

    /// Current position of `client` in the window. Does not charge.
    pub async fn usage(
        &self,
        client: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<QuotaUsage, StorageError> {
        let cutoff = self.cutoff(now);
        let used = self.ledger.count_since(client, cutoff).await?;
        let oldest = self.ledger.oldest_since(client, cutoff).await?;

        Ok(QuotaUsage {
            used,
            limit: self.limit,
            remaining: u64::from(self.limit).saturating_sub(used),
            next_release_at: oldest.map(|ts| ts + self.window),
        })
    }

    /// Admit, run `op`, and charge the call only if `op` succeeded.
    pub async fn run_metered<T, F, Fut>(
        &self,
        client: &ClientId,
        call_type: CallType,
        op: F,
    ) -> crate::error::Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::error::Result<T>>,
    {
        if !self.admit(client, Utc::now()).await?.is_allowed() {
            return Err(EnhancerError::QuotaExceeded { limit: self.limit });
        }

        let value = op().await?;

        let record = self.ledger.record(client, call_type, Utc::now()).await?;
        tracing::debug!(client = %client, call_type = %call_type, id = record.id, "call recorded");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeneratorError;
    use crate::usage::SqliteUsageLedger;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    async fn limiter_in(dir: &TempDir) -> (RateLimiter, Arc<SqliteUsageLedger>) {
        let ledger = Arc::new(
            SqliteUsageLedger::open(&dir.path().join("usage.db"))
                .await
                .unwrap(),
        );
        (RateLimiter::new(ledger.clone()), ledger)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 9, 30, 0).unwrap()
    }

    async fn fill(ledger: &SqliteUsageLedger, client: &ClientId, n: usize, at: DateTime<Utc>) {
        for _ in 0..n {
            ledger.record(client, CallType::Generate, at).await.unwrap();
        }
    }

    #[tokio::test]
    async fn admits_below_limit_and_denies_at_limit() {
        let dir = TempDir::new().unwrap();
        let (limiter, ledger) = limiter_in(&dir).await;
        let client = ClientId::from("10.0.0.7");

        fill(&ledger, &client, 24, t0()).await;
        let now = t0() + Duration::minutes(5);
        assert_eq!(limiter.admit(&client, now).await.unwrap(), Admission::Allowed);

        fill(&ledger, &client, 1, t0()).await;
        assert_eq!(limiter.admit(&client, now).await.unwrap(), Admission::Denied);

        fill(&ledger, &client, 5, t0()).await;
        assert_eq!(limiter.admit(&client, now).await.unwrap(), Admission::Denied);
    }

    #[tokio::test]
    async fn calls_age_out_after_the_window() {
        let dir = TempDir::new().unwrap();
        let (limiter, ledger) = limiter_in(&dir).await;
        let client = ClientId::from("10.0.0.8");

        fill(&ledger, &client, 25, t0()).await;

        let just_inside = t0() + Duration::hours(24) - Duration::seconds(1);
        assert_eq!(
            limiter.admit(&client, just_inside).await.unwrap(),
            Admission::Denied
        );

        let just_after = t0() + Duration::hours(24) + Duration::seconds(1);
        assert_eq!(
            limiter.admit(&client, just_after).await.unwrap(),
            Admission::Allowed
        );
    }

    #[tokio::test]
    async fn quota_is_per_client() {
        let dir = TempDir::new().unwrap();
        let (limiter, ledger) = limiter_in(&dir).await;
        let heavy = ClientId::from("10.0.0.1");
        let light = ClientId::from("10.0.0.2");

        fill(&ledger, &heavy, 25, t0()).await;
        let now = t0() + Duration::hours(1);
        assert_eq!(limiter.admit(&heavy, now).await.unwrap(), Admission::Denied);
        assert_eq!(limiter.admit(&light, now).await.unwrap(), Admission::Allowed);
    }

    #[tokio::test]
    async fn usage_reports_remaining_and_release_time() {
        let dir = TempDir::new().unwrap();
        let (limiter, ledger) = limiter_in(&dir).await;
        let client = ClientId::from("10.0.0.3");

        fill(&ledger, &client, 2, t0()).await;
        fill(&ledger, &client, 1, t0() + Duration::hours(2)).await;

        let usage = limiter
            .usage(&client, t0() + Duration::hours(3))
            .await
            .unwrap();
        assert_eq!(usage.used, 3);
        assert_eq!(usage.limit, DAILY_CALL_LIMIT);
        assert_eq!(usage.remaining, 22);
        assert_eq!(usage.next_release_at, Some(t0() + Duration::hours(24)));

        let fresh = limiter
            .usage(&ClientId::from("10.9.9.9"), t0())
            .await
            .unwrap();
        assert_eq!(fresh.remaining, 25);
        assert!(fresh.next_release_at.is_none());
    }

    #[tokio::test]
    async fn run_metered_charges_only_on_success() {
        let dir = TempDir::new().unwrap();
        let (limiter, ledger) = limiter_in(&dir).await;
        let client = ClientId::from("10.0.0.4");
        let window_start = Utc::now() - Duration::hours(1);

        let ok = limiter
            .run_metered(&client, CallType::Test, || async { Ok("fine") })
            .await
            .unwrap();
        assert_eq!(ok, "fine");
        assert_eq!(ledger.count_since(&client, window_start).await.unwrap(), 1);

        let failed: crate::error::Result<()> = limiter
            .run_metered(&client, CallType::Test, || async {
                Err(GeneratorError::Request {
                    provider: "gemini".into(),
                    message: "timeout".into(),
                }
                .into())
            })
            .await;
        assert!(matches!(failed, Err(EnhancerError::Generator(_))));
        assert_eq!(ledger.count_since(&client, window_start).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn run_metered_denied_never_runs_the_operation() {
        let dir = TempDir::new().unwrap();
        let (limiter, ledger) = limiter_in(&dir).await;
        let client = ClientId::from("10.0.0.5");
        fill(&ledger, &client, 25, Utc::now() - Duration::minutes(10)).await;

        let calls = AtomicUsize::new(0);
        let result = limiter
            .run_metered(&client, CallType::Generate, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        match result {
            Err(EnhancerError::QuotaExceeded { limit }) => assert_eq!(limit, 25),
            other => panic!("expected quota error, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_metered_surfaces_storage_failure_before_the_operation() {
        let dir = TempDir::new().unwrap();
        let (limiter, ledger) = limiter_in(&dir).await;
        ledger.close().await;

        let calls = AtomicUsize::new(0);
        let result = limiter
            .run_metered(&ClientId::from("10.0.0.6"), CallType::Refine, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(EnhancerError::Storage(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
