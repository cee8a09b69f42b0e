//! Adaptive rendering-quality control for decorative animated backgrounds.
//!
//! The crate decides budgets; it never draws. The overall flow is:
//!
//! ```text
//!   EnvironmentSignals ──probe()──▶ CapabilitySnapshot ──select_initial()──▶ QualitySettings
//!                                                                                │
//!   host frame loop ──record_frame()──▶ FrameTimingSampler ──FrameMetrics──▶ adapt()
//! ```
//!
//! `AdaptiveSession` packages the loop for hosts that want it driven for
//! them; hosts with their own loop call the sampler and selector directly.
mod capability;
pub mod diagnostics;
mod host;
mod sampler;
mod selector;
mod session;
mod ticks;

pub use capability::{probe, CapabilitySnapshot, EnvironmentSignals, NetworkQuality, StaticSignals};
pub use diagnostics::{diagnose, DiagnosticIssue, DiagnosticReport};
pub use host::{HostSignals, SignalOverrides};
pub use sampler::{FrameMetrics, FrameTimingSampler, ListenerHandle, SamplerState};
pub use selector::{QualitySettings, QualityTierSelector, SelectionError, Tier};
pub use session::{AdaptiveSession, SettingsChange};
pub use ticks::{PacedTicks, ScriptedTicks, TickSource};
