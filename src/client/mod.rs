//! Client-side request management for dashboard views.
//!
//! Two complementary pieces keep UI demand from hammering the pricing
//! pipeline: the preload queue warms the shared cache ahead of need, and the
//! per-view coalescer turns rapid token-list changes into single, cancelable
//! batch fetches.

pub mod coalescer;
pub mod preload;

pub use coalescer::{
    CoalescerConfig, CoalescerStats, HoldingsProvider, PnlCoalescer, PnlSource,
    ServicePnlSource, TokenPnl,
};
pub use preload::{PreloadConfig, PreloadQueue, PreloadSink, PreloadStatus};
