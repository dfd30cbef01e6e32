// ABOUTME: Clock synchronization for the Sendspin timeline
// ABOUTME: Server timeline to local monotonic mapping and static delay

/// Timeline clock implementation
pub mod clock;

pub use clock::{
    instant_to_monotonic_us, monotonic_us, ClockUpdate, TimelineClock, TimelineSample,
    DEFAULT_RESYNC_THRESHOLD_US,
};
