//! Fall detection.
//!
//! Consumes one acceleration magnitude per invocation and decides, with a
//! two-phase hysteresis, whether the wearer fell and then stayed still.
//! A single extreme sample only opens a watch window; the incident is
//! confirmed by sustained near-stillness and cancelled by resumed motion.

use crate::config::DetectorConfig;

/// Per-sample detector verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallAssessment {
    /// Nothing unusual
    Idle,
    /// An extreme sample opened the watch window, awaiting confirmation
    Watching,
    /// Shock followed by sustained stillness, treat as incident
    Confirmed,
}

/// Two-phase fall detector.
///
/// Phase 1 (idle): a sample below `free_fall_g` or above `impact_g` records
/// the trigger time and enters the watch phase.
/// Phase 2 (watch): a sample outside the stillness band after the grace
/// period cancels the watch; surviving to `confirm_ms` confirms the
/// incident. Either way the trigger resets, so a later fall is detected
/// independently.
///
/// The verdict deliberately favors false positives: a spurious confirmation
/// costs a cancellable local alarm, a miss costs an unreported emergency.
pub struct FallDetector {
    config: DetectorConfig,
    /// 0 is the idle sentinel
    trigger_ms: u64,
}

impl FallDetector {
    pub fn new(config: DetectorConfig) -> Self {
        FallDetector {
            config,
            trigger_ms: 0,
        }
    }

    /// Forget any watch in progress
    pub fn reset(&mut self) {
        self.trigger_ms = 0;
    }

    pub fn is_watching(&self) -> bool {
        self.trigger_ms != 0
    }

    /// Feed one acceleration sample, `g` in multiples of 1g.
    pub fn update(&mut self, g: f64, now_ms: u64) -> FallAssessment {
        if self.trigger_ms == 0 {
            if g < self.config.free_fall_g || g > self.config.impact_g {
                // max(1) keeps the idle sentinel unambiguous
                self.trigger_ms = now_ms.max(1);
                log::debug!("fall watch opened at {}ms (sample {:.2}g)", now_ms, g);
                return FallAssessment::Watching;
            }
            return FallAssessment::Idle;
        }

        let elapsed = now_ms.saturating_sub(self.trigger_ms);

        if elapsed >= self.config.confirm_ms {
            self.trigger_ms = 0;
            log::warn!("fall confirmed after {}ms of stillness", elapsed);
            return FallAssessment::Confirmed;
        }

        let outside_band = g < self.config.still_low_g || g > self.config.still_high_g;
        if elapsed > self.config.cancel_grace_ms && outside_band {
            // Normal motion resumed, wearer presumed unharmed
            self.trigger_ms = 0;
            log::debug!("fall watch cancelled at +{}ms (sample {:.2}g)", elapsed, g);
            return FallAssessment::Idle;
        }

        FallAssessment::Watching
    }
}
