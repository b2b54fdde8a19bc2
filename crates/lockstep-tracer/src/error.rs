//! Error types for lockstep-tracer

use thiserror::Error;

/// Fatal validation outcome.
///
/// Every variant carries the rendered diagnostic report (stack dumps and
/// recent history) so it can be printed without re-running.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Divergence {
    /// Reference and engine stacks differ in length
    #[error("stack size mismatch after {opcode} at pc {pc}: reference {reference}, engine {engine}\n{report}")]
    StackSize {
        /// Instruction just validated
        opcode: String,
        /// Reference pc before the instruction
        pc: usize,
        /// Reference stack length
        reference: usize,
        /// Engine stack length
        engine: usize,
        /// Rendered report
        report: String,
    },

    /// Same length, different contents
    #[error("stack content mismatch after {opcode} at pc {pc}, depth {depth}: reference {reference}, engine {engine}\n{report}")]
    StackContent {
        /// Instruction just validated
        opcode: String,
        /// Reference pc before the instruction
        pc: usize,
        /// Distance from the top of the first differing item
        depth: usize,
        /// Reference item, hex
        reference: String,
        /// Engine item, hex
        engine: String,
        /// Rendered report
        report: String,
    },

    /// Independent pc tracking disagrees with what the engine dispatched
    #[error("pc mismatch at {pc}: engine claims {claimed}, bytecode has {found}\n{report}")]
    PcMismatch {
        /// Tracked pc
        pc: usize,
        /// Claimed primitive
        claimed: String,
        /// Actual byte, by name
        found: String,
        /// Rendered report
        report: String,
    },

    /// Instruction ceiling hit
    #[error("instruction limit of {limit} exceeded, likely an endless loop\n{report}")]
    InstructionLimit {
        /// Configured ceiling
        limit: u64,
        /// Rendered report
        report: String,
    },

    /// Dispatched instruction is not the one the previous instruction announced
    #[error("dispatch mismatch: expected {expected}, got {actual}\n{report}")]
    DispatchMismatch {
        /// Announced cursor
        expected: String,
        /// Cursor actually dispatched
        actual: String,
        /// Rendered report
        report: String,
    },

    /// Internal consistency check failed
    #[error("assertion failed: {message}\n{report}")]
    Assertion {
        /// What went wrong
        message: String,
        /// Rendered report
        report: String,
    },
}

impl Divergence {
    /// The rendered diagnostic report
    pub fn report(&self) -> &str {
        match self {
            Divergence::StackSize { report, .. }
            | Divergence::StackContent { report, .. }
            | Divergence::PcMismatch { report, .. }
            | Divergence::InstructionLimit { report, .. }
            | Divergence::DispatchMismatch { report, .. }
            | Divergence::Assertion { report, .. } => report,
        }
    }

    /// Short kind label
    pub fn kind(&self) -> &'static str {
        match self {
            Divergence::StackSize { .. } => "stack-size",
            Divergence::StackContent { .. } => "stack-content",
            Divergence::PcMismatch { .. } => "pc",
            Divergence::InstructionLimit { .. } => "instruction-limit",
            Divergence::DispatchMismatch { .. } => "dispatch",
            Divergence::Assertion { .. } => "assertion",
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Malformed JSON
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    /// Well-formed but unusable
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divergence_display_includes_report() {
        let d = Divergence::InstructionLimit { limit: 5, report: "history".into() };
        let text = d.to_string();
        assert!(text.contains("instruction limit of 5"));
        assert!(text.ends_with("history"));
        assert_eq!(d.report(), "history");
        assert_eq!(d.kind(), "instruction-limit");
    }

    #[test]
    fn test_config_error_from_json() {
        let err: ConfigError = serde_json::from_str::<u8>("x").unwrap_err().into();
        assert!(err.to_string().starts_with("invalid config json"));
    }
}
