pub mod ledger;
pub mod limiter;
pub mod types;

pub use ledger::{SqliteUsageLedger, UsageLedger};
pub use limiter::{Admission, DAILY_CALL_LIMIT, QUOTA_WINDOW_HOURS, RateLimiter};
pub use types::{CallRecord, CallType, ClientId, QuotaUsage};
