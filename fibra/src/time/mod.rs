//! Timer primitives.

use crate::routine::context::{Context, EventRound};
use crate::routine::core::EventStatus;

use std::time::{Duration, Instant};

/// Suspends the calling routine for at least `duration`.
///
/// Only the routine sleeps; its worker keeps scheduling other work.
///
/// # Examples
///
/// ```rust,ignore
/// fibra::time::sleep(ctx, Duration::from_millis(10));
/// ```
pub fn sleep(ctx: &mut Context, duration: Duration) {
    sleep_until(ctx, Instant::now() + duration);
}

/// Suspends the calling routine until `deadline`.
///
/// Returns immediately if the deadline already passed.
pub fn sleep_until(ctx: &mut Context, deadline: Instant) {
    let mut round = EventRound::new();
    round.add_timer(deadline);
    let result = round.commit(ctx);

    debug_assert_eq!(result.status, EventStatus::TimedOut);
}
