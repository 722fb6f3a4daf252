//! Requirements and guarantees declared by operators
//!
//! Joins declare the smallest buffer budget they can run under; index scans
//! declare the index they depend on. A [`ConstraintContext`] describes what
//! the current execution actually provides and checks declarations against it.

use serde::{Deserialize, Serialize};

/// Constraint that an operator requires from its environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    /// The type of constraint being required
    pub constraint_type: ConstraintType,
    /// Human-readable description of why this constraint is needed
    pub description: String,
}

/// Types of constraints that operators can require
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintType {
    /// At least this many buffer pages
    MinimumBufferPages(usize),
    /// A secondary index on the named column
    RequiresIndex(String),
}

impl Constraint {
    pub fn minimum_buffer_pages(pages: usize, description: impl Into<String>) -> Self {
        Self {
            constraint_type: ConstraintType::MinimumBufferPages(pages),
            description: description.into(),
        }
    }

    pub fn requires_index(column: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            constraint_type: ConstraintType::RequiresIndex(column.into()),
            description: description.into(),
        }
    }
}

/// Guarantee that an operator provides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guarantee {
    /// The type of guarantee being provided
    pub guarantee_type: GuaranteeType,
    /// Human-readable description of the guarantee
    pub description: String,
    /// Level of guarantee (strict or best-effort)
    pub level: GuaranteeLevel,
}

/// Types of guarantees that operators can provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuaranteeType {
    /// Output is ordered on the join or index key
    SortedOutput,
    /// Identical inputs always produce identical output order
    DeterministicOrder,
    /// Resident pages never exceed the buffer budget
    BoundedMemory,
    /// Stored relations are never modified
    ReadOnly,
}

/// Level of guarantee provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuaranteeLevel {
    /// Always maintained
    Strict,
    /// Maintained under normal conditions
    BestEffort,
}

impl Guarantee {
    pub fn new(
        guarantee_type: GuaranteeType,
        level: GuaranteeLevel,
        description: impl Into<String>,
    ) -> Self {
        Self {
            guarantee_type,
            description: description.into(),
            level,
        }
    }

    pub fn strict(guarantee_type: GuaranteeType, description: impl Into<String>) -> Self {
        Self::new(guarantee_type, GuaranteeLevel::Strict, description)
    }

    pub fn best_effort(guarantee_type: GuaranteeType, description: impl Into<String>) -> Self {
        Self::new(guarantee_type, GuaranteeLevel::BestEffort, description)
    }
}

/// What an execution environment provides
#[derive(Debug, Clone, Default)]
pub struct ConstraintContext {
    /// Buffer pages available to the operator
    pub buffer_pages: usize,
    /// Columns carrying a secondary index
    pub indexed_columns: Vec<String>,
}

impl ConstraintContext {
    pub fn with_buffer_pages(buffer_pages: usize) -> Self {
        Self {
            buffer_pages,
            indexed_columns: Vec::new(),
        }
    }

    pub fn with_index(mut self, column: impl Into<String>) -> Self {
        self.indexed_columns.push(column.into());
        self
    }

    /// Check if a constraint can be satisfied
    pub fn can_satisfy(&self, constraint: &Constraint) -> bool {
        match &constraint.constraint_type {
            ConstraintType::MinimumBufferPages(required) => self.buffer_pages >= *required,
            ConstraintType::RequiresIndex(column) => self.indexed_columns.iter().any(|c| c == column),
        }
    }

    /// Check all constraints of an operator
    pub fn check_constraints(&self, constraints: &[Constraint]) -> ConstraintCheckResult {
        let failures: Vec<ConstraintFailure> = constraints
            .iter()
            .filter(|c| !self.can_satisfy(c))
            .map(|c| ConstraintFailure {
                constraint: c.clone(),
                reason: format!("Constraint not satisfied: {}", c.description),
            })
            .collect();

        ConstraintCheckResult {
            satisfied: failures.is_empty(),
            failures,
        }
    }
}

/// Result of constraint checking
#[derive(Debug, Clone)]
pub struct ConstraintCheckResult {
    /// Whether all constraints are satisfied
    pub satisfied: bool,
    /// List of constraint failures
    pub failures: Vec<ConstraintFailure>,
}

impl ConstraintCheckResult {
    /// Failure reasons joined for logging
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| f.reason.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Information about a constraint that failed
#[derive(Debug, Clone)]
pub struct ConstraintFailure {
    /// The constraint that failed
    pub constraint: Constraint,
    /// Reason for failure
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_budget() {
        let requires = vec![Constraint::minimum_buffer_pages(3, "two input pages and one output")];

        assert!(ConstraintContext::with_buffer_pages(3).check_constraints(&requires).satisfied);

        let result = ConstraintContext::with_buffer_pages(2).check_constraints(&requires);
        assert!(!result.satisfied);
        assert_eq!(result.failures.len(), 1);
        assert!(result.summary().contains("two input pages"));
    }

    #[test]
    fn test_requires_index() {
        let requires = vec![Constraint::requires_index("age", "lookups go through the index")];
        let ctx = ConstraintContext::with_buffer_pages(3);
        assert!(!ctx.check_constraints(&requires).satisfied);
        assert!(ctx.with_index("age").check_constraints(&requires).satisfied);
    }

    #[test]
    fn test_guarantee_levels() {
        let g = Guarantee::strict(GuaranteeType::BoundedMemory, "at most B pages");
        assert_eq!(g.level, GuaranteeLevel::Strict);
        let g = Guarantee::best_effort(GuaranteeType::DeterministicOrder, "stable");
        assert_eq!(g.level, GuaranteeLevel::BestEffort);
    }
}
