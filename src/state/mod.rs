// ABOUTME: Remote session state tracking
// ABOUTME: Metadata, group and controller snapshot with interpolated progress

/// Event-driven state aggregator
pub mod aggregator;

pub use aggregator::{GroupInfo, PlaybackState, StateAggregator, TrackMetadata};
