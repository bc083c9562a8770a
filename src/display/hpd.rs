//! Hot-plug detection
//!
//! The raw HPD line bounces while a cable is inserted. [`HpdDebouncer`]
//! only reports a level once it has been stable for the debounce window;
//! [`HpdWorker`] samples the line on every kick (hot-plug interrupt) and
//! on a poll timer, and publishes [`HotplugEvent`]s.

use log::{debug, info, trace, warn};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{debugfs, ConnectorId, Shared};

/// Connection change of one display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotplugEvent {
    pub display: String,
    pub connector: Option<ConnectorId>,
    pub connected: bool,
}

/// HPD level debouncer
#[derive(Debug, Clone)]
pub struct HpdDebouncer {
    window: Duration,
    stable: Option<bool>,
    /// Candidate level and when it was first seen
    pending: Option<(bool, Instant)>,
}

impl HpdDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            stable: None,
            pending: None,
        }
    }

    /// Debouncer that already trusts `level`
    pub fn with_level(window: Duration, level: bool) -> Self {
        Self {
            window,
            stable: Some(level),
            pending: None,
        }
    }

    pub fn stable_level(&self) -> Option<bool> {
        self.stable
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Trust `level` from now on, dropping any pending change
    pub fn reset(&mut self, level: bool) {
        self.stable = Some(level);
        self.pending = None;
    }

    /// A change is waiting out the window
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed one sample; returns the new level when a change is confirmed
    ///
    /// The first sample only establishes the level.
    pub fn feed(&mut self, level: bool, now: Instant) -> Option<bool> {
        let Some(stable) = self.stable else {
            self.stable = Some(level);
            return None;
        };

        if level == stable {
            if self.pending.take().is_some() {
                trace!("HPD bounce ignored");
            }
            return None;
        }

        let since = match self.pending {
            Some((_, since)) => since,
            None => {
                self.pending = Some((level, now));
                now
            }
        };
        if now.saturating_duration_since(since) >= self.window {
            self.stable = Some(level);
            self.pending = None;
            return Some(level);
        }
        None
    }
}

enum HpdCommand {
    Kick,
    Stop,
}

/// Per-display HPD work thread
pub(crate) struct HpdWorker {
    tx: Sender<HpdCommand>,
    handle: Option<JoinHandle<()>>,
}

impl HpdWorker {
    /// Start sampling; the debouncer in the display state must be seeded
    pub(crate) fn start(
        shared: Arc<Shared>,
        poll_interval: Duration,
        events: Option<Sender<HotplugEvent>>,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let name = format!("hpd-{}", shared.name);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run(&shared, rx, poll_interval, events))?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Schedule an immediate sample
    pub(crate) fn kick(&self) {
        let _ = self.tx.send(HpdCommand::Kick);
    }

    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.tx.send(HpdCommand::Stop);
            if handle.join().is_err() {
                warn!("HPD worker panicked");
            }
        }
    }
}

impl Drop for HpdWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    shared: &Shared,
    rx: mpsc::Receiver<HpdCommand>,
    poll_interval: Duration,
    events: Option<Sender<HotplugEvent>>,
) {
    debug!("{}: HPD worker started", shared.name);
    loop {
        let timeout = {
            let st = shared.lock();
            if st.hpd.is_pending() {
                (st.hpd.window() / 4).max(Duration::from_millis(1))
            } else {
                poll_interval
            }
        };
        match rx.recv_timeout(timeout) {
            Ok(HpdCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(HpdCommand::Kick) | Err(RecvTimeoutError::Timeout) => {}
        }

        let event = {
            let mut st = shared.lock();
            let Some(ctrl) = st.ctrl.ctrl.as_mut() else {
                break;
            };
            let level = match ctrl.hpd_asserted() {
                Ok(level) => level,
                Err(e) => {
                    warn!("{}: HPD read failed: {:#}", shared.name, e);
                    continue;
                }
            };
            match st.hpd.feed(level, Instant::now()) {
                Some(connected) => {
                    if st.set_connected(connected) {
                        debugfs::refresh(&shared.name, &st);
                        Some(HotplugEvent {
                            display: shared.name.clone(),
                            connector: st.connector,
                            connected,
                        })
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        if let Some(event) = event {
            info!(
                "{}: {}",
                shared.name,
                if event.connected { "connected" } else { "disconnected" }
            );
            if let Some(events) = &events {
                let _ = events.send(event);
            }
        }
    }
    debug!("{}: HPD worker stopped", shared.name);
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    #[test]
    fn test_first_sample_sets_level() {
        let mut d = HpdDebouncer::new(WINDOW);
        assert_eq!(d.feed(true, Instant::now()), None);
        assert_eq!(d.stable_level(), Some(true));
        assert!(!d.is_pending());
    }

    #[test]
    fn test_change_after_window() {
        let t0 = Instant::now();
        let mut d = HpdDebouncer::with_level(WINDOW, false);
        assert_eq!(d.feed(true, t0), None);
        assert!(d.is_pending());
        assert_eq!(d.feed(true, t0 + Duration::from_millis(50)), None);
        assert_eq!(d.feed(true, t0 + Duration::from_millis(100)), Some(true));
        assert_eq!(d.stable_level(), Some(true));
        assert!(!d.is_pending());
        // Stable again: nothing more to report
        assert_eq!(d.feed(true, t0 + Duration::from_millis(200)), None);
    }

    #[test]
    fn test_bounce_cancels_change() {
        let t0 = Instant::now();
        let mut d = HpdDebouncer::with_level(WINDOW, true);
        assert_eq!(d.feed(false, t0), None);
        assert_eq!(d.feed(true, t0 + Duration::from_millis(30)), None);
        assert!(!d.is_pending());
        // The window restarts from the next low sample
        assert_eq!(d.feed(false, t0 + Duration::from_millis(120)), None);
        assert_eq!(d.feed(false, t0 + Duration::from_millis(200)), None);
        assert_eq!(d.feed(false, t0 + Duration::from_millis(220)), Some(false));
    }

    #[test]
    fn test_zero_window_reports_immediately() {
        let mut d = HpdDebouncer::with_level(Duration::ZERO, false);
        assert_eq!(d.feed(true, Instant::now()), Some(true));
    }

    #[test]
    fn test_reset_drops_pending_change() {
        let t0 = Instant::now();
        let mut d = HpdDebouncer::with_level(WINDOW, false);
        assert_eq!(d.feed(true, t0), None);
        d.reset(true);
        assert!(!d.is_pending());
        assert_eq!(d.stable_level(), Some(true));
        // A later unplug is measured against the new level
        assert_eq!(d.feed(false, t0 + Duration::from_millis(10)), None);
        assert_eq!(d.feed(false, t0 + Duration::from_millis(110)), Some(false));
    }
}
