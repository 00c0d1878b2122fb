//! Wrap-tolerant time helpers shared by the engine.

use flowguard_traits::Millis;

pub use flowguard_traits::clock::elapsed as elapsed_ms;

/// True once at least `period` ms have passed since `since`.
/// A period of zero is treated as "disabled" and never fires.
#[inline]
pub fn period_elapsed(now: Millis, since: Millis, period: Millis) -> bool {
    period > 0 && elapsed_ms(now, since) >= period
}

/// Fresh correlation id with separators stripped (32 hex chars).
pub fn correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
