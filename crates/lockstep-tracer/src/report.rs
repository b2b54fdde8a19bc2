//! Human-readable divergence reports

use std::fmt;

use lockstep_evm::opcode_name;
use lockstep_primitives::{H256, U256};

use crate::step_log::ExecutionStep;
use crate::unified::UnifiedOpcode;

/// Everything printed when validation fails
#[derive(Debug, Clone)]
pub struct DiagnosticReport<'a> {
    title: &'a str,
    instruction: Option<(UnifiedOpcode, usize)>,
    stacks: Option<(&'a [U256], &'a [U256])>,
    history: Vec<&'a ExecutionStep>,
    stack_depth: usize,
}

impl<'a> DiagnosticReport<'a> {
    /// Empty report under `title`
    pub fn new(title: &'a str) -> Self {
        Self { title, instruction: None, stacks: None, history: Vec::new(), stack_depth: 10 }
    }

    /// Instruction being validated and the reference pc it started at
    pub fn instruction(mut self, opcode: UnifiedOpcode, pc: usize) -> Self {
        self.instruction = Some((opcode, pc));
        self
    }

    /// Both stacks, bottom first
    pub fn stacks(mut self, reference: &'a [U256], engine: &'a [U256]) -> Self {
        self.stacks = Some((reference, engine));
        self
    }

    /// Recent steps, oldest first
    pub fn history(mut self, steps: impl IntoIterator<Item = &'a ExecutionStep>) -> Self {
        self.history = steps.into_iter().collect();
        self
    }

    /// Stack entries printed per side
    pub fn stack_depth(mut self, depth: usize) -> Self {
        self.stack_depth = depth;
        self
    }

    /// Render to a string
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DiagnosticReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ===", self.title)?;
        if let Some((opcode, pc)) = self.instruction {
            writeln!(f, "instruction: {} (id 0x{:03x}) at pc {}", opcode, opcode.id(), pc)?;
        }

        if let Some((reference, engine)) = self.stacks {
            writeln!(f, "stacks (top first): reference {} items, engine {} items", reference.len(), engine.len())?;
            let rows = reference.len().max(engine.len()).min(self.stack_depth);
            for depth in 0..rows {
                let r = top_down(reference, depth);
                let e = top_down(engine, depth);
                let marker = if r == e { ' ' } else { '!' };
                writeln!(f, "{marker} [{depth:>2}] {:<66} | {}", word(r), word(e))?;
            }
            let hidden = reference.len().max(engine.len()).saturating_sub(rows);
            if hidden > 0 {
                writeln!(f, "  ... {hidden} deeper entries omitted")?;
            }
        }

        if !self.history.is_empty() {
            writeln!(f, "recent steps (oldest first):")?;
            writeln!(
                f,
                "{:>6} {:>6} {:<16} {:>10} {:>10} {:>9} {:>6} {:>6} flags",
                "step", "pc", "opcode", "gas-in", "gas-out", "stack", "mem", "sched"
            )?;
            for step in &self.history {
                let mut flags = String::new();
                if step.synthetic {
                    flags.push_str(step.instruction.name());
                }
                if step.error_occurred {
                    if !flags.is_empty() {
                        flags.push(' ');
                    }
                    flags.push_str("ERR");
                }
                writeln!(
                    f,
                    "{:>6} {:>6} {:<16} {:>10} {:>10} {:>4}->{:<4} {:>6} {:>6} {}",
                    step.index,
                    step.pc,
                    opcode_name(step.opcode),
                    step.gas_before,
                    step.gas_after,
                    step.stack_before,
                    step.stack_after,
                    step.memory_size,
                    step.schedule_index,
                    flags
                )?;
            }
        }
        Ok(())
    }
}

fn top_down(stack: &[U256], depth: usize) -> Option<U256> {
    stack.len().checked_sub(depth + 1).map(|i| stack[i])
}

fn word(value: Option<U256>) -> String {
    match value {
        Some(v) => H256::from(v).to_hex(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_evm::Opcode;

    fn step() -> ExecutionStep {
        ExecutionStep {
            index: 7,
            opcode: 0x03,
            instruction: UnifiedOpcode::from(Opcode::SUB),
            pc: 4,
            gas_before: 100,
            gas_after: 97,
            stack_before: 2,
            stack_after: 1,
            memory_size: 0,
            schedule_index: 2,
            synthetic: false,
            error_occurred: true,
            stack_snapshot: vec![U256::from(2)],
        }
    }

    #[test]
    fn test_report_marks_differing_rows() {
        let reference = [U256::from(1), U256::from(2)];
        let engine = [U256::from(1), U256::from(3)];
        let steps = [step()];
        let text = DiagnosticReport::new("stack content mismatch")
            .instruction(Opcode::SUB.into(), 4)
            .stacks(&reference, &engine)
            .history(steps.iter())
            .render();

        assert!(text.starts_with("=== stack content mismatch ==="));
        assert!(text.contains("instruction: SUB (id 0x003) at pc 4"));
        assert!(text.contains(&format!("! [ 0] {}", word(Some(U256::from(2))))));
        assert!(text.contains(&format!("  [ 1] {}", word(Some(U256::from(1))))));
        assert!(text.contains(&format!("{:0>64}", "3")));
        assert!(text.contains("ERR"));
    }

    #[test]
    fn test_report_truncates_deep_stacks() {
        let stack: Vec<U256> = (0..15u64).map(U256::from).collect();
        let text = DiagnosticReport::new("t").stacks(&stack, &stack).stack_depth(10).render();
        assert!(text.contains("5 deeper entries omitted"));
        assert!(!text.contains("[10]"));
    }

    #[test]
    fn test_report_shows_missing_side() {
        let reference = [U256::from(1)];
        let text = DiagnosticReport::new("t").stacks(&reference, &[]).render();
        assert!(text.contains("| -"));
    }
}
