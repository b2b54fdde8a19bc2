//! # lockstep-tracer
//!
//! Lock-step validation of an optimizing EVM engine against the reference
//! interpreter in `lockstep-evm`.
//!
//! The engine calls [`Tracer`] hooks around every instruction it dispatches,
//! including fused instructions that stand for several primitive opcodes.
//! [`ValidatingTracer`] replays each one on a reference frame through the
//! [`FusionSynchronizer`], checks the claimed opcodes with an independent
//! [`PcTracker`] and compares stacks, memory size and gas with the
//! [`DivergenceValidator`].
//!
//! Engines pick the tracer at build time through [`SelectedTracer`]: the
//! `validate` feature selects [`ValidatingTracer`], otherwise the zero-sized
//! [`NoopTracer`] is used.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod frame_view;
pub mod pc_tracker;
pub mod report;
pub mod step_log;
pub mod synchronizer;
pub mod tracer;
pub mod unified;
pub mod validating;
pub mod validator;

pub use config::ValidatorConfig;
pub use error::{ConfigError, Divergence};
pub use frame_view::{Cursor, FrameView};
pub use pc_tracker::{PcMismatch, PcTracker};
pub use report::DiagnosticReport;
pub use step_log::{ExecutionStep, RingBuffer, StepLog, SNAPSHOT_DEPTH};
pub use synchronizer::{DriveOutcome, FusionSynchronizer};
pub use tracer::{NoopTracer, SelectedTracer, Tracer};
pub use unified::{FusionKind, PatternStep, UnifiedOpcode, SYNTHETIC_BASE};
pub use validating::ValidatingTracer;
pub use validator::{compare_stacks, DivergenceValidator, StackMismatch, ValidationStats};
