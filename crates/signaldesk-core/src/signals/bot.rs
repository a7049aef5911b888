//! Background loop that rolls for a signal every interval.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::generator::{generate_tick, Signal, SignalFeed, SignalSettings};
use crate::event_bus::{EventBus, SIGNAL_EVENT};

struct BotInner {
    settings: Mutex<SignalSettings>,
    feed: Mutex<SignalFeed>,
    rng: Mutex<StdRng>,
    event_bus: Option<Arc<EventBus>>,
}

impl BotInner {
    fn tick(&self) -> Option<Signal> {
        let candidate = {
            let mut rng = self.rng.lock().ok()?;
            generate_tick(&mut *rng, Utc::now())?
        };
        let settings = self.settings.lock().ok()?.clone();

        let accepted = self.feed.lock().ok()?.offer(candidate.clone(), &settings);
        if !accepted {
            return None;
        }

        log::info!("New signal: {}", candidate);
        if let Some(bus) = &self.event_bus {
            bus.emit(SIGNAL_EVENT, &candidate);
        }
        Some(candidate)
    }
}

pub struct SignalBot {
    inner: Arc<BotInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SignalBot {
    pub fn new(settings: SignalSettings) -> Self {
        Self::with_rng(settings, StdRng::from_entropy())
    }

    /// Deterministic bot for tests and replays.
    pub fn with_seed(settings: SignalSettings, seed: u64) -> Self {
        Self::with_rng(settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(settings: SignalSettings, rng: StdRng) -> Self {
        Self {
            inner: Arc::new(BotInner {
                settings: Mutex::new(settings.clamped()),
                feed: Mutex::new(SignalFeed::new()),
                rng: Mutex::new(rng),
                event_bus: None,
            }),
            task: Mutex::new(None),
        }
    }

    /// Publish accepted signals as `signals:new`.
    ///
    /// Must be called before the bot is shared.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.event_bus = Some(bus);
        }
        self
    }

    pub fn settings(&self) -> SignalSettings {
        self.inner
            .settings
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Replace the settings. A new interval applies from the next `start`.
    pub fn set_settings(&self, settings: SignalSettings) {
        if let Ok(mut current) = self.inner.settings.lock() {
            *current = settings.clamped();
        }
    }

    /// Start ticking. Does nothing if already running.
    pub fn start(&self) {
        let Ok(mut task) = self.task.lock() else {
            return;
        };
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let period = self.settings().interval();
        let inner = self.inner.clone();
        log::info!("Signal bot started ({}s interval)", period.as_secs());

        *task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                inner.tick();
            }
        }));
    }

    pub fn stop(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
                log::info!("Signal bot stopped");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|t| t.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Up to ten most recent signals, newest first.
    pub fn recent(&self) -> Vec<Signal> {
        self.inner
            .feed
            .lock()
            .map(|f| f.recent())
            .unwrap_or_default()
    }
}

impl Drop for SignalBot {
    fn drop(&mut self) {
        self.stop();
    }
}
