//! Run spend tracking and budget enforcement

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::models::{CostLedger, Language};

/// Running cost of a pipeline run, with an optional budget
#[derive(Debug, Clone)]
pub struct CostTracker {
    ledger: Arc<RwLock<CostLedger>>,
}

impl CostTracker {
    /// Create a tracker; `None` means unlimited
    pub fn new(budget_inr: Option<f64>) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(CostLedger::new(budget_inr))),
        }
    }

    /// Check whether `cost_inr` still fits the budget
    pub async fn can_spend(&self, cost_inr: f64) -> bool {
        let ledger = self.ledger.read().await;
        ledger.can_spend(cost_inr)
    }

    /// Record a completed stage
    pub async fn record(&self, language: Language, chars: u64, cost_inr: f64) {
        {
            let mut ledger = self.ledger.write().await;
            ledger.record(language, chars, cost_inr);
        }

        let ledger = self.ledger.read().await;
        debug!(
            "Recorded ₹{:.2} for {} ({} chars), run total ₹{:.2}",
            cost_inr,
            language,
            chars,
            ledger.spent()
        );
    }

    /// Total spent so far in this run
    pub async fn spent(&self) -> f64 {
        self.ledger.read().await.spent()
    }

    /// Remaining budget, if one is set
    pub async fn remaining(&self) -> Option<f64> {
        self.ledger.read().await.remaining()
    }

    /// Get current ledger
    pub async fn get_stats(&self) -> CostLedger {
        self.ledger.read().await.clone()
    }

    /// Check if budget is low (less than 10% remaining)
    pub async fn is_low(&self) -> bool {
        let ledger = self.ledger.read().await;
        match (ledger.budget_inr, ledger.remaining()) {
            (Some(budget), Some(remaining)) => remaining < budget / 10.0,
            _ => false,
        }
    }
}
