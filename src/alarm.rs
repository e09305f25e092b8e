//! Incident alarm.
//!
//! Owns the local countdown that runs between a confirmed fall and the
//! emergency escalation. During the countdown the wearer gets a 1 Hz
//! blink/beep and can cancel; once the wait elapses the alarm requests the
//! one-time emergency report and settles into a slow reminder beep. The
//! alarm performs no I/O itself: each tick returns the effects for the
//! controller to act on.

use crate::config::AlarmTimingConfig;

/// Effects requested for the current tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmTick {
    /// False during the cancellable countdown, true after the wait elapsed
    pub escalated: bool,
    /// Sound the buzzer on this tick
    pub beep: bool,
    /// Send the emergency report now; set at most once per incident
    pub send_emergency: bool,
}

#[derive(Debug)]
struct Armed {
    key: String,
    started_ms: u64,
    last_beep_ms: u64,
}

/// Countdown plus single-shot escalation for one incident episode.
pub struct IncidentAlarm {
    config: AlarmTimingConfig,
    armed: Option<Armed>,
    /// Incident key of the last emergency report actually requested,
    /// guards against re-sending under repeated polling
    last_sent_key: Option<String>,
}

impl IncidentAlarm {
    pub fn new(config: AlarmTimingConfig) -> Self {
        IncidentAlarm {
            config,
            armed: None,
            last_sent_key: None,
        }
    }

    /// Start the countdown for the incident identified by `key`.
    pub fn arm(&mut self, key: String, now_ms: u64) {
        log::info!("incident alarm armed ({})", key);
        self.armed = Some(Armed {
            key,
            started_ms: now_ms,
            last_beep_ms: now_ms,
        });
    }

    /// User cancel: silence immediately, discard the episode, no message.
    pub fn cancel(&mut self) {
        if self.armed.take().is_some() {
            log::info!("incident alarm cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn has_escalated(&self, now_ms: u64) -> bool {
        self.armed
            .as_ref()
            .map(|a| now_ms.saturating_sub(a.started_ms) >= self.config.local_wait_ms)
            .unwrap_or(false)
    }

    /// Advance the alarm; `None` when no incident is armed.
    pub fn tick(&mut self, now_ms: u64) -> Option<AlarmTick> {
        let armed = self.armed.as_mut()?;
        let elapsed = now_ms.saturating_sub(armed.started_ms);

        if elapsed < self.config.local_wait_ms {
            let beep = now_ms.saturating_sub(armed.last_beep_ms) >= self.config.blink_period_ms;
            if beep {
                armed.last_beep_ms = now_ms;
            }
            return Some(AlarmTick {
                escalated: false,
                beep,
                send_emergency: false,
            });
        }

        let send_emergency = self.last_sent_key.as_deref() != Some(armed.key.as_str());
        if send_emergency {
            self.last_sent_key = Some(armed.key.clone());
            // Restart the beep cadence from the escalation point
            armed.last_beep_ms = now_ms;
            log::warn!(
                "incident alarm escalated after {}ms ({})",
                elapsed,
                armed.key
            );
            return Some(AlarmTick {
                escalated: true,
                beep: true,
                send_emergency: true,
            });
        }

        let beep = now_ms.saturating_sub(armed.last_beep_ms) >= self.config.beep_period_ms;
        if beep {
            armed.last_beep_ms = now_ms;
        }
        Some(AlarmTick {
            escalated: true,
            beep,
            send_emergency: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alarm() -> IncidentAlarm {
        IncidentAlarm::new(AlarmTimingConfig::default())
    }

    #[test]
    fn test_unarmed_alarm_ticks_to_none() {
        let mut alarm = alarm();
        assert!(alarm.tick(1_000).is_none());
    }

    #[test]
    fn test_countdown_blinks_at_one_hz() {
        let mut alarm = alarm();
        alarm.arm("session_1:5000".to_string(), 5_000);

        // 100ms polling: a beep roughly once per second, never escalated
        let mut beeps = 0;
        for t in (5_100..15_000).step_by(100) {
            let tick = alarm.tick(t).unwrap();
            assert!(!tick.escalated);
            assert!(!tick.send_emergency);
            if tick.beep {
                beeps += 1;
            }
        }
        assert_eq!(beeps, 9);
    }

    #[test]
    fn test_escalates_once_after_wait() {
        let mut alarm = alarm();
        alarm.arm("session_1:0".to_string(), 0);

        let tick = alarm.tick(30_000).unwrap();
        assert!(tick.escalated);
        assert!(tick.send_emergency);

        // Repeated polling after the wait never re-requests the report
        for t in (30_100..90_000).step_by(100) {
            let tick = alarm.tick(t).unwrap();
            assert!(tick.escalated);
            assert!(!tick.send_emergency);
        }
    }

    #[test]
    fn test_escalated_beep_every_ten_seconds() {
        let mut alarm = alarm();
        alarm.arm("session_1:0".to_string(), 0);
        alarm.tick(30_000).unwrap();

        let mut beeps = 0;
        for t in (30_100..60_100).step_by(100) {
            if alarm.tick(t).unwrap().beep {
                beeps += 1;
            }
        }
        assert_eq!(beeps, 3);
    }

    #[test]
    fn test_cancel_silences_without_sending() {
        let mut alarm = alarm();
        alarm.arm("session_1:0".to_string(), 0);
        alarm.tick(10_000).unwrap();

        alarm.cancel();
        assert!(!alarm.is_armed());
        assert!(alarm.tick(31_000).is_none());
    }

    #[test]
    fn test_new_episode_sends_again() {
        let mut alarm = alarm();
        alarm.arm("session_1:1000".to_string(), 1_000);
        assert!(alarm.tick(31_000).unwrap().send_emergency);
        alarm.cancel();

        // Second incident in the same session gets a distinct key
        alarm.arm("session_1:60000".to_string(), 60_000);
        let tick = alarm.tick(90_000).unwrap();
        assert!(tick.send_emergency);
    }
}
