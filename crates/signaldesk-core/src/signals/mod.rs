//! Automated trading signals.

mod bot;
mod generator;

pub use bot::SignalBot;
pub use generator::{
    generate_tick, Direction, Pair, Signal, SignalFeed, SignalSettings, CONFIDENCE_RANGE,
    FEED_CAPACITY, SIGNAL_PROBABILITY,
};
