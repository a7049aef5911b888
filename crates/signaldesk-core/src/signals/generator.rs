//! Simulated trading signal generation.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Most recent signals kept by a [`SignalFeed`].
pub const FEED_CAPACITY: usize = 10;

/// Chance that a single tick produces a signal.
pub const SIGNAL_PROBABILITY: f64 = 0.3;

pub const CONFIDENCE_RANGE: std::ops::RangeInclusive<u8> = 75..=99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pair {
    #[serde(rename = "EURUSD")]
    EurUsd,
    #[serde(rename = "GBPUSD")]
    GbpUsd,
    #[serde(rename = "USDJPY")]
    UsdJpy,
}

impl Pair {
    pub const ALL: [Pair; 3] = [Pair::EurUsd, Pair::GbpUsd, Pair::UsdJpy];

    pub fn symbol(self) -> &'static str {
        match self {
            Pair::EurUsd => "EURUSD",
            Pair::GbpUsd => "GBPUSD",
            Pair::UsdJpy => "USDJPY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: String,
    pub pair: Pair,
    pub direction: Direction,
    /// Percent, 75..=99.
    pub confidence: u8,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}% @ {}",
            self.pair.symbol(),
            self.direction,
            self.confidence,
            self.timestamp.format("%H:%M:%S")
        )
    }
}

/// Bot tuning. Out-of-range values are pulled back by [`clamped`](Self::clamped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalSettings {
    pub interval_secs: u64,
    pub min_confidence: u8,
    pub max_signals_per_hour: u32,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            min_confidence: 75,
            max_signals_per_hour: 5,
        }
    }
}

impl SignalSettings {
    pub fn clamped(self) -> Self {
        Self {
            interval_secs: self.interval_secs.clamp(30, 300),
            min_confidence: self.min_confidence.clamp(60, 95),
            max_signals_per_hour: self.max_signals_per_hour.max(1),
        }
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }
}

/// Roll one tick. Returns `None` on the (70%) quiet ticks.
pub fn generate_tick<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> Option<Signal> {
    if !rng.gen_bool(SIGNAL_PROBABILITY) {
        return None;
    }

    let pair = *Pair::ALL.choose(rng)?;
    let direction = if rng.gen_bool(0.5) {
        Direction::Buy
    } else {
        Direction::Sell
    };

    Some(Signal {
        id: uuid::Uuid::new_v4().to_string(),
        pair,
        direction,
        confidence: rng.gen_range(CONFIDENCE_RANGE),
        timestamp: now,
    })
}

/// Recent signals, newest first, with the confidence floor and hourly cap
/// applied on the way in.
#[derive(Debug, Default)]
pub struct SignalFeed {
    recent: VecDeque<Signal>,
    emitted_at: VecDeque<DateTime<Utc>>,
}

impl SignalFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a candidate. Returns `true` if it was accepted.
    pub fn offer(&mut self, signal: Signal, settings: &SignalSettings) -> bool {
        if signal.confidence < settings.min_confidence {
            log::debug!(
                "Dropping {} signal below {}% confidence",
                signal.pair.symbol(),
                settings.min_confidence
            );
            return false;
        }

        let window_start = signal.timestamp - Duration::hours(1);
        while self
            .emitted_at
            .front()
            .is_some_and(|at| *at <= window_start)
        {
            self.emitted_at.pop_front();
        }
        if self.emitted_at.len() >= settings.max_signals_per_hour as usize {
            log::debug!("Hourly signal cap reached");
            return false;
        }

        self.emitted_at.push_back(signal.timestamp);
        self.recent.push_front(signal);
        self.recent.truncate(FEED_CAPACITY);
        true
    }

    pub fn recent(&self) -> Vec<Signal> {
        self.recent.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}
