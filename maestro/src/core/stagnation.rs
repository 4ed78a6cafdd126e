//! Consecutive-WAIT stagnation guard.

/// Result of recording one WAIT directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagnationVerdict {
    KeepWaiting { consecutive_waits: u32 },
    Escalate { consecutive_waits: u32 },
}

/// Counts consecutive WAIT directives and fires exactly once when the count
/// reaches the threshold. The counter keeps growing past the threshold until
/// something resets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagnationGuard {
    threshold: u32,
    consecutive_waits: u32,
}

impl StagnationGuard {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_waits: 0,
        }
    }

    pub fn record_wait(&mut self) -> StagnationVerdict {
        self.consecutive_waits = self.consecutive_waits.saturating_add(1);
        if self.consecutive_waits == self.threshold {
            StagnationVerdict::Escalate {
                consecutive_waits: self.consecutive_waits,
            }
        } else {
            StagnationVerdict::KeepWaiting {
                consecutive_waits: self.consecutive_waits,
            }
        }
    }

    /// Called on any successful non-WAIT directive or operator intervention.
    pub fn reset(&mut self) {
        self.consecutive_waits = 0;
    }

    pub fn consecutive_waits(&self) -> u32 {
        self.consecutive_waits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_once_at_threshold() {
        let mut guard = StagnationGuard::new(5);
        let verdicts: Vec<_> = (0..7).map(|_| guard.record_wait()).collect();
        let escalations = verdicts
            .iter()
            .filter(|v| matches!(v, StagnationVerdict::Escalate { .. }))
            .count();
        assert_eq!(escalations, 1);
        assert_eq!(
            verdicts[4],
            StagnationVerdict::Escalate {
                consecutive_waits: 5
            }
        );
    }

    #[test]
    fn reset_restarts_the_count() {
        let mut guard = StagnationGuard::new(2);
        guard.record_wait();
        guard.reset();
        assert_eq!(
            guard.record_wait(),
            StagnationVerdict::KeepWaiting {
                consecutive_waits: 1
            }
        );
        assert!(matches!(guard.record_wait(), StagnationVerdict::Escalate { .. }));
    }
}
