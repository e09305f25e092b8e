//! Local user interface.
//!
//! One multi-color indicator plus a buzzer render the session state table;
//! a momentary button (delivered to the scheduler loop as button-press
//! events) drives START/END/cancel. The engine talks to [`Panel`] only, the
//! binary backs it with a console rendering.

/// Indicator states for the multi-color light
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLight {
    /// No session, device idle
    Idle,
    /// Session running, all normal
    Climbing,
    /// Incident countdown, cancellable
    AlarmBlink,
    /// Escalated incident, steady alarm
    AlarmSteady,
}

/// Output side of the local panel
pub trait Panel {
    /// Set the indicator; implementations may dedupe repeated states
    fn set_light(&mut self, light: StatusLight);

    /// Sound one beep
    fn beep(&mut self);
}

/// Console-backed panel for bench runs: renders indicator changes and
/// beeps through the log.
pub struct ConsolePanel {
    current: Option<StatusLight>,
}

impl ConsolePanel {
    pub fn new() -> Self {
        ConsolePanel { current: None }
    }
}

impl Panel for ConsolePanel {
    fn set_light(&mut self, light: StatusLight) {
        if self.current == Some(light) {
            return;
        }
        self.current = Some(light);
        match light {
            StatusLight::Idle => log::info!("[panel] indicator: idle (blue)"),
            StatusLight::Climbing => log::info!("[panel] indicator: climbing (green)"),
            StatusLight::AlarmBlink => log::info!("[panel] indicator: alarm countdown (red blink)"),
            StatusLight::AlarmSteady => log::info!("[panel] indicator: escalated (red steady)"),
        }
    }

    fn beep(&mut self) {
        log::info!("[panel] beep");
    }
}

impl Default for ConsolePanel {
    fn default() -> Self {
        Self::new()
    }
}

/// Panel recording every output, shared-handle style so tests can keep a
/// reference while the controller owns the other clone.
#[cfg(test)]
#[derive(Clone)]
pub struct RecordingPanel {
    inner: std::sync::Arc<std::sync::Mutex<(Vec<StatusLight>, usize)>>,
}

#[cfg(test)]
impl RecordingPanel {
    pub fn new() -> Self {
        RecordingPanel {
            inner: std::sync::Arc::new(std::sync::Mutex::new((Vec::new(), 0))),
        }
    }

    pub fn lights(&self) -> Vec<StatusLight> {
        self.inner.lock().unwrap().0.clone()
    }

    pub fn beeps(&self) -> usize {
        self.inner.lock().unwrap().1
    }
}

#[cfg(test)]
impl Panel for RecordingPanel {
    fn set_light(&mut self, light: StatusLight) {
        let mut inner = self.inner.lock().unwrap();
        if inner.0.last() != Some(&light) {
            inner.0.push(light);
        }
    }

    fn beep(&mut self) {
        self.inner.lock().unwrap().1 += 1;
    }
}
