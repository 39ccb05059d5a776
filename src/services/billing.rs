// src/services/billing.rs
//! Pure billing math. Everything here is a function of the call record's
//! frozen fields plus the measured duration; nothing reads the store.

use rust_decimal::Decimal;

use crate::models::CallKind;

/// Calls at or under this duration are free, no exceptions.
pub const GRACE_PERIOD_SECONDS: i64 = 5;
/// A first call gets the discounted rate for its first five minutes.
pub const FIRST_CALL_DISCOUNT_WINDOW_SECONDS: i64 = 300;
/// Seekers need at least this balance before a call may start.
pub const MIN_CALL_BALANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

const SECONDS_PER_MINUTE: i64 = 60;

/// Discounted per-minute rate frozen onto a seeker's first call.
pub fn first_call_rate() -> Decimal {
    Decimal::ONE
}

/// Standard seeker rate per minute by call kind.
pub fn standard_rate(kind: CallKind) -> Decimal {
    match kind {
        CallKind::Voice => Decimal::from(5),
        CallKind::Video => Decimal::from(8),
    }
}

/// Fixed per-minute listener payout by call kind. Independent of the seeker
/// rate; the platform margin is whatever is left over.
pub fn payout_rate(kind: CallKind) -> Decimal {
    match kind {
        CallKind::Voice => Decimal::from(3),
        CallKind::Video => Decimal::from(5),
    }
}

/// Resolve the per-minute rate frozen onto a call at creation. A first call
/// always gets the discount rate; otherwise the standard rate for the kind,
/// reduced by any active subscription discount percentage. Never recomputed
/// after creation.
pub fn resolve_rate(kind: CallKind, is_first_call: bool, discount_percent: Option<Decimal>) -> Decimal {
    if is_first_call {
        return first_call_rate();
    }
    let base = standard_rate(kind);
    match discount_percent {
        Some(pct) if pct > Decimal::ZERO => {
            (base - base * pct / Decimal::from(100)).round_dp(2)
        }
        _ => base,
    }
}

/// Seeker cost for a completed call, rounded to 2 decimal places.
///
/// - within the grace period: free;
/// - non-first call: the first minute in full, every second past 60 billed
///   proportionally;
/// - first call: the same shape at the discounted rate while inside the
///   discount window, then five discounted minutes plus the remainder at the
///   standard rate for the kind.
pub fn call_cost(
    duration_seconds: i64,
    rate_per_minute: Decimal,
    is_first_call: bool,
    kind: CallKind,
) -> Decimal {
    if duration_seconds <= GRACE_PERIOD_SECONDS {
        return Decimal::ZERO;
    }

    let cost = if is_first_call && duration_seconds > FIRST_CALL_DISCOUNT_WINDOW_SECONDS {
        let discounted = rate_per_minute * Decimal::from(5);
        let overflow = per_minute_fraction(duration_seconds - FIRST_CALL_DISCOUNT_WINDOW_SECONDS)
            * standard_rate(kind);
        discounted + overflow
    } else {
        let overflow_seconds = (duration_seconds - SECONDS_PER_MINUTE).max(0);
        rate_per_minute + per_minute_fraction(overflow_seconds) * rate_per_minute
    };

    cost.round_dp(2)
}

/// Listener payout for a completed call: pro-rated per second from the fixed
/// payout table, rounded to 2 decimal places.
pub fn listener_payout(duration_seconds: i64, kind: CallKind) -> Decimal {
    if duration_seconds <= 0 {
        return Decimal::ZERO;
    }
    (per_minute_fraction(duration_seconds) * payout_rate(kind)).round_dp(2)
}

fn per_minute_fraction(seconds: i64) -> Decimal {
    Decimal::from(seconds) / Decimal::from(SECONDS_PER_MINUTE)
}
