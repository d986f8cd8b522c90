//! Partition walk budget

/// Counter of partitions examined so far in one scan
///
/// Created once by the top-level scan and lent by `&mut` to every pass and
/// every step of the EBR chain. It is never reset, so the configured ceiling
/// bounds the total work of the scan however the chain is shaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkBudget {
    examined: u32,
    limit: u32,
}

impl WalkBudget {
    /// Create a budget allowing `limit` partitions
    pub fn new(limit: u32) -> Self {
        Self { examined: 0, limit }
    }

    /// Record one more examined partition
    pub fn charge(&mut self) {
        self.examined = self.examined.saturating_add(1);
    }

    /// True once the ceiling has been reached
    pub fn is_exhausted(&self) -> bool {
        self.examined >= self.limit
    }

    /// Partitions examined so far
    pub fn examined(&self) -> u32 {
        self.examined
    }

    /// Configured ceiling
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Partitions still allowed before the ceiling
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.examined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exhaustion() {
        let mut budget = WalkBudget::new(2);
        assert!(!budget.is_exhausted());
        assert_eq!(budget.remaining(), 2);

        budget.charge();
        assert!(!budget.is_exhausted());

        budget.charge();
        assert!(budget.is_exhausted());
        assert_eq!(budget.examined(), 2);
        assert_eq!(budget.remaining(), 0);

        // Charging past the ceiling keeps counting
        budget.charge();
        assert_eq!(budget.examined(), 3);
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_zero_budget_is_exhausted() {
        assert!(WalkBudget::new(0).is_exhausted());
    }
}
