//! Keep-alive cadence and the acknowledgement checks that share its shape.

use std::time::{Duration, Instant};

use cobble_session::KeepAliveTiming;

/// What one maintenance cycle decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Beat {
    /// Nothing to send yet.
    Idle,
    /// Send a keep-alive carrying this nonce.
    Send(i64),
    /// Too many cycles found the pending nonce overdue.
    Expired,
}

/// Advances the keep-alive clock by one maintenance cycle.
pub(crate) fn beat(
    timing: &mut KeepAliveTiming,
    now: Instant,
    interval: Duration,
    max_missed: u32,
) -> Beat {
    if let Some((_, sent_at)) = timing.pending {
        if now.saturating_duration_since(sent_at) >= interval {
            timing.missed += 1;
            if timing.missed > max_missed {
                return Beat::Expired;
            }
        }
        return Beat::Idle;
    }
    let due = timing
        .last_sent
        .is_none_or(|last| now.saturating_duration_since(last) >= interval);
    if !due {
        return Beat::Idle;
    }
    let nonce = rand::random::<i64>();
    timing.pending = Some((nonce, now));
    timing.last_sent = Some(now);
    Beat::Send(nonce)
}

/// How a keep-alive reply compared with the pending nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reply {
    Matched { latency_ms: u32 },
    Mismatch { expected: Option<i64> },
}

/// Checks a reply. Only a matching nonce touches the timing record.
pub(crate) fn reply(timing: &mut KeepAliveTiming, id: i64, now: Instant) -> Reply {
    match timing.pending {
        Some((nonce, sent_at)) if nonce == id => {
            let elapsed = now.saturating_duration_since(sent_at).as_millis();
            let latency_ms = u32::try_from(elapsed).unwrap_or(u32::MAX);
            timing.pending = None;
            timing.missed = 0;
            timing.latency_ms = Some(latency_ms);
            Reply::Matched { latency_ms }
        }
        pending => Reply::Mismatch {
            expected: pending.map(|(nonce, _)| nonce),
        },
    }
}

/// Clears `pending` when `received` matches it. On a mismatch the pending
/// value is kept and `Err` carries what was expected.
pub(crate) fn acknowledge<T: Copy + PartialEq>(
    pending: &mut Option<T>,
    received: T,
) -> Result<(), Option<T>> {
    match *pending {
        Some(expected) if expected == received => {
            *pending = None;
            Ok(())
        }
        other => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(15);

    #[test]
    fn test_beat_first_cycle_sends_nonce() {
        let mut timing = KeepAliveTiming::default();
        let now = Instant::now();
        let Beat::Send(nonce) = beat(&mut timing, now, INTERVAL, 3) else {
            panic!("expected a keep-alive");
        };
        assert_eq!(timing.pending, Some((nonce, now)));
    }

    #[test]
    fn test_beat_waits_for_interval_after_reply() {
        let mut timing = KeepAliveTiming::default();
        let start = Instant::now();
        let Beat::Send(nonce) = beat(&mut timing, start, INTERVAL, 3) else {
            panic!("expected a keep-alive");
        };
        reply(&mut timing, nonce, start + Duration::from_millis(40));
        assert_eq!(beat(&mut timing, start + Duration::from_secs(5), INTERVAL, 3), Beat::Idle);
        assert!(matches!(
            beat(&mut timing, start + INTERVAL, INTERVAL, 3),
            Beat::Send(_)
        ));
    }

    #[test]
    fn test_beat_expires_after_max_missed_cycles() {
        let mut timing = KeepAliveTiming::default();
        let start = Instant::now();
        beat(&mut timing, start, INTERVAL, 2);
        let late = start + INTERVAL;
        assert_eq!(beat(&mut timing, late, INTERVAL, 2), Beat::Idle);
        assert_eq!(beat(&mut timing, late, INTERVAL, 2), Beat::Idle);
        assert_eq!(beat(&mut timing, late, INTERVAL, 2), Beat::Expired);
    }

    #[test]
    fn test_beat_overdue_not_counted_before_interval() {
        let mut timing = KeepAliveTiming::default();
        let start = Instant::now();
        beat(&mut timing, start, INTERVAL, 0);
        assert_eq!(beat(&mut timing, start + Duration::from_secs(1), INTERVAL, 0), Beat::Idle);
        assert_eq!(timing.missed, 0);
    }

    #[test]
    fn test_reply_matching_records_latency() {
        let mut timing = KeepAliveTiming::default();
        let start = Instant::now();
        timing.pending = Some((7, start));
        timing.missed = 2;
        let result = reply(&mut timing, 7, start + Duration::from_millis(120));
        assert_eq!(result, Reply::Matched { latency_ms: 120 });
        assert_eq!(timing.latency_ms, Some(120));
        assert_eq!(timing.missed, 0);
        assert!(timing.pending.is_none());
    }

    #[test]
    fn test_reply_mismatch_changes_nothing() {
        let mut timing = KeepAliveTiming::default();
        let start = Instant::now();
        timing.pending = Some((7, start));
        timing.latency_ms = Some(50);
        let result = reply(&mut timing, 8, start + Duration::from_millis(120));
        assert_eq!(result, Reply::Mismatch { expected: Some(7) });
        assert_eq!(timing.latency_ms, Some(50));
        assert_eq!(timing.pending, Some((7, start)));
    }

    #[test]
    fn test_acknowledge_clears_only_on_match() {
        let mut pending = Some(5);
        assert_eq!(acknowledge(&mut pending, 6), Err(Some(5)));
        assert_eq!(pending, Some(5));
        assert_eq!(acknowledge(&mut pending, 5), Ok(()));
        assert_eq!(pending, None);
        assert_eq!(acknowledge(&mut pending, 5), Err(None));
    }
}
