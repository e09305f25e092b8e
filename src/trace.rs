//! Altitude trace batching.
//!
//! The batcher samples relative height at a fixed minimum interval and
//! accumulates points into a bounded buffer. A full buffer flushes
//! automatically; session end drains whatever is left so no in-flight data
//! is lost.

use serde::{Deserialize, Serialize};

/// One (time offset, relative height) sample of the climb
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    /// Seconds since session start
    #[serde(rename = "time")]
    pub time_s: f64,
    /// Meters relative to the session baseline altitude
    #[serde(rename = "height")]
    pub height_m: f64,
}

/// Bounded FIFO of trace points with an explicit length.
///
/// Owned exclusively by the batcher; cleared to empty on every flush.
#[derive(Debug)]
pub struct TraceBuffer {
    points: Vec<TracePoint>,
    capacity: usize,
}

impl TraceBuffer {
    pub fn new(capacity: usize) -> Self {
        TraceBuffer {
            points: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.points.len() >= self.capacity
    }

    /// Append a point; silently drops when full (the batcher flushes before
    /// that can happen)
    pub fn push(&mut self, point: TracePoint) {
        if !self.is_full() {
            self.points.push(point);
        }
    }

    /// Hand out the accumulated points and clear the buffer
    pub fn take(&mut self) -> Vec<TracePoint> {
        std::mem::take(&mut self.points)
    }
}

/// Telemetry batcher: sampling gate plus flush decision.
pub struct TelemetryBatcher {
    buffer: TraceBuffer,
    sample_interval_ms: u64,
    last_sample_ms: u64,
}

impl TelemetryBatcher {
    pub fn new(trace_capacity: usize, sample_interval_ms: u64) -> Self {
        TelemetryBatcher {
            buffer: TraceBuffer::new(trace_capacity),
            sample_interval_ms,
            last_sample_ms: 0,
        }
    }

    /// Start a fresh session trace; the first sample lands one interval
    /// after `session_start_ms`.
    pub fn reset(&mut self, session_start_ms: u64) {
        self.buffer.take();
        self.last_sample_ms = session_start_ms;
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// True when the minimum interval has elapsed and a call to
    /// [`sample`](Self::sample) would take a new point.
    pub fn due(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_sample_ms) >= self.sample_interval_ms
    }

    /// Sampling step, called once per scheduler tick.
    ///
    /// This is a minimum-interval gate, not a precise timer: ticks faster
    /// than the interval are no-ops. Returns the full ordered trace when the
    /// buffer reaches capacity.
    pub fn sample(
        &mut self,
        now_ms: u64,
        session_start_ms: u64,
        altitude_m: f64,
        baseline_m: f64,
    ) -> Option<Vec<TracePoint>> {
        if now_ms.saturating_sub(self.last_sample_ms) < self.sample_interval_ms {
            return None;
        }
        self.last_sample_ms = now_ms;

        self.buffer.push(TracePoint {
            time_s: now_ms.saturating_sub(session_start_ms) as f64 / 1000.0,
            height_m: altitude_m - baseline_m,
        });

        if self.buffer.is_full() {
            Some(self.buffer.take())
        } else {
            None
        }
    }

    /// Final flush on session end; `None` when nothing is pending.
    pub fn drain(&mut self) -> Option<Vec<TracePoint>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.take())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sampling_gate_skips_fast_ticks() {
        let mut batcher = TelemetryBatcher::new(40, 500);
        batcher.reset(0);

        assert!(batcher.sample(100, 0, 1201.0, 1200.0).is_none());
        assert_eq!(batcher.pending(), 0);

        assert!(batcher.sample(500, 0, 1201.0, 1200.0).is_none());
        assert_eq!(batcher.pending(), 1);

        // Next tick inside the interval is a no-op
        assert!(batcher.sample(700, 0, 1202.0, 1200.0).is_none());
        assert_eq!(batcher.pending(), 1);
    }

    #[test]
    fn test_auto_flush_exactly_at_capacity() {
        let capacity = 40;
        let mut batcher = TelemetryBatcher::new(capacity, 500);
        batcher.reset(0);

        let mut now = 0;
        for i in 0..capacity - 1 {
            now += 500;
            let flushed = batcher.sample(now, 0, 1200.0 + i as f64, 1200.0);
            assert!(flushed.is_none(), "no flush before capacity");
        }

        now += 500;
        let trace = batcher
            .sample(now, 0, 1300.0, 1200.0)
            .expect("flush at capacity");
        assert_eq!(trace.len(), capacity);
        assert_eq!(batcher.pending(), 0);

        // Points are ordered by time offset
        for pair in trace.windows(2) {
            assert!(pair[0].time_s < pair[1].time_s);
        }
    }

    #[test]
    fn test_drain_flushes_remainder_once() {
        let mut batcher = TelemetryBatcher::new(40, 500);
        batcher.reset(0);

        for i in 1..=5 {
            batcher.sample(i * 500, 0, 1210.0, 1200.0);
        }

        let remainder = batcher.drain().expect("non-empty drain");
        assert_eq!(remainder.len(), 5);
        assert!(batcher.drain().is_none(), "second drain is empty");
    }

    #[test]
    fn test_drain_on_empty_buffer_is_none() {
        let mut batcher = TelemetryBatcher::new(40, 500);
        batcher.reset(0);
        assert!(batcher.drain().is_none());
    }

    #[test]
    fn test_relative_height_round_trips_to_absolute() {
        let baseline = 1843.7;
        let absolute = 1851.24;
        let mut batcher = TelemetryBatcher::new(40, 500);
        batcher.reset(1_000);

        batcher.sample(1_500, 1_000, absolute, baseline);
        let remainder = batcher.drain().unwrap();
        assert_relative_eq!(remainder[0].height_m + baseline, absolute);
        assert_relative_eq!(remainder[0].time_s, 0.5);
    }

    #[test]
    fn test_offsets_measured_from_session_start() {
        let mut batcher = TelemetryBatcher::new(40, 500);
        batcher.reset(10_000);

        batcher.sample(12_000, 10_000, 1205.0, 1200.0);
        let points = batcher.drain().unwrap();
        assert_relative_eq!(points[0].time_s, 2.0);
        assert_relative_eq!(points[0].height_m, 5.0);
    }
}
