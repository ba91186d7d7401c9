//! Page Renderer + Render Scheduler — §4.5/§4.6.
//!
//! `renderer` drives one browser context per job (navigation fallback tiers,
//! resource blocking, soft-404 detection). `scheduler` owns the single-flight
//! table, the `N`-wide concurrency semaphore, and `QueueMetrics`.

pub mod renderer;
pub mod scheduler;

pub use renderer::{PageRenderer, RenderOutcome, RENDERER_USER_AGENT};
pub use scheduler::{QueueMetrics, RenderPriority, RenderScheduler};
