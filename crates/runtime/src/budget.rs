//! Token budget monitor.
//!
//! Tracks cumulative input+output token usage across iterations, summed
//! from provider usage metadata (falling back to a heuristic estimate when
//! none is reported), and decides halt/warn at each iteration boundary.

use tracing::warn;

use ironloop_core::config::{BudgetStrategy, TokenBudget};
use ironloop_core::context::Context;
use ironloop_core::provider::Usage;

use crate::token::estimate_context_tokens;

/// The decision taken at an iteration boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetCheck {
    /// Within budget, keep going
    Proceed,
    /// Warn threshold crossed under the `Warn` strategy
    Warn { used: u64, limit: u64, utilization: f64 },
    /// Limit reached under the `Halt` strategy
    Halt { used: u64, limit: u64 },
}

/// Per-invocation usage accumulator.
#[derive(Debug, Clone)]
pub struct BudgetMonitor {
    budget: Option<TokenBudget>,
    used: u64,
}

impl BudgetMonitor {
    pub fn new(budget: Option<TokenBudget>) -> Self {
        Self { budget, used: 0 }
    }

    /// Record provider-reported usage for one iteration.
    pub fn record(&mut self, usage: &Usage) {
        self.used += u64::from(usage.total_tokens);
    }

    /// Record a heuristic estimate when the provider reported no usage.
    pub fn record_estimate(&mut self, tokens: u64) {
        self.used += tokens;
    }

    /// Cumulative tokens consumed so far.
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Tokens left before the limit, if a budget is configured.
    pub fn tokens_remaining(&self) -> Option<u64> {
        self.budget.as_ref().map(|b| b.limit.saturating_sub(self.used))
    }

    /// Fraction of the budget consumed (0.0 when no budget is set).
    pub fn utilization(&self) -> f64 {
        match &self.budget {
            Some(b) if b.limit > 0 => self.used as f64 / b.limit as f64,
            _ => 0.0,
        }
    }

    /// Apply the configured strategy at an iteration boundary.
    pub fn check(&self) -> BudgetCheck {
        let Some(budget) = &self.budget else {
            return BudgetCheck::Proceed;
        };
        match budget.strategy {
            BudgetStrategy::Halt if self.used >= budget.limit => {
                BudgetCheck::Halt { used: self.used, limit: budget.limit }
            }
            BudgetStrategy::Warn => {
                let threshold = (budget.limit as f64 * budget.warn_threshold) as u64;
                if self.used >= threshold {
                    warn!(
                        used = self.used,
                        limit = budget.limit,
                        "Token budget warn threshold crossed"
                    );
                    BudgetCheck::Warn {
                        used: self.used,
                        limit: budget.limit,
                        utilization: self.utilization(),
                    }
                } else {
                    BudgetCheck::Proceed
                }
            }
            _ => BudgetCheck::Proceed,
        }
    }
}

/// Heuristic token count for a context, for callers without provider usage.
pub fn estimate_token_count(context: &Context) -> u64 {
    estimate_context_tokens(context)
}

/// Tokens left before the limit for the given context and budget.
pub fn tokens_remaining(context: &Context, budget: &TokenBudget) -> u64 {
    let used = context.total_tokens().max(estimate_token_count(context));
    budget.limit.saturating_sub(used)
}

/// Fraction of the budget consumed by the given context.
pub fn budget_utilization(context: &Context, budget: &TokenBudget) -> f64 {
    if budget.limit == 0 {
        return 0.0;
    }
    let used = context.total_tokens().max(estimate_token_count(context));
    used as f64 / budget.limit as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(total: u32) -> Usage {
        Usage { prompt_tokens: total / 2, completion_tokens: total - total / 2, total_tokens: total }
    }

    #[test]
    fn no_budget_always_proceeds() {
        let mut monitor = BudgetMonitor::new(None);
        monitor.record(&usage(1_000_000));
        assert_eq!(monitor.check(), BudgetCheck::Proceed);
        assert_eq!(monitor.tokens_remaining(), None);
    }

    #[test]
    fn halt_strategy_trips_at_limit() {
        let mut monitor = BudgetMonitor::new(Some(TokenBudget::halt(1000)));
        monitor.record(&usage(600));
        assert_eq!(monitor.check(), BudgetCheck::Proceed);
        monitor.record(&usage(600));
        assert_eq!(monitor.check(), BudgetCheck::Halt { used: 1200, limit: 1000 });
    }

    #[test]
    fn warn_strategy_fires_at_threshold_and_continues() {
        let mut monitor = BudgetMonitor::new(Some(TokenBudget::warn(1000)));
        monitor.record(&usage(700));
        assert_eq!(monitor.check(), BudgetCheck::Proceed);
        monitor.record(&usage(150));
        match monitor.check() {
            BudgetCheck::Warn { used, limit, .. } => {
                assert_eq!(used, 850);
                assert_eq!(limit, 1000);
            }
            other => panic!("expected warn, got {other:?}"),
        }
        // Warn never halts, even past the limit
        monitor.record(&usage(500));
        assert!(matches!(monitor.check(), BudgetCheck::Warn { .. }));
    }

    #[test]
    fn utilization_fraction() {
        let mut monitor = BudgetMonitor::new(Some(TokenBudget::halt(1000)));
        monitor.record(&usage(250));
        assert!((monitor.utilization() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let mut monitor = BudgetMonitor::new(Some(TokenBudget::halt(100)));
        monitor.record(&usage(250));
        assert_eq!(monitor.tokens_remaining(), Some(0));
    }
}
