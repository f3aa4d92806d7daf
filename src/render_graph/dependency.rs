//! Fan-out accounting for render graph nodes

/// Counts how many consumers of a node have run in the current pass.
///
/// `total_dependants` is owned by the graph and follows the link set.
/// Every consumer that finishes calls [`DependencyResolver::is_resolved`]
/// once; the call that reaches the total reports `true` and rewinds the
/// counter so the node can be gated again in a later pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyResolver {
    total_dependants: usize,
    consumed: usize,
}

impl DependencyResolver {
    pub fn new(total_dependants: usize) -> Self {
        Self {
            total_dependants,
            consumed: 0,
        }
    }

    pub fn total_dependants(&self) -> usize {
        self.total_dependants
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub(crate) fn add_dependant(&mut self) {
        self.total_dependants += 1;
    }

    pub(crate) fn remove_dependant(&mut self) {
        self.total_dependants = self.total_dependants.saturating_sub(1);
        self.consumed = self.consumed.min(self.total_dependants);
    }

    /// Record one consumer and report whether all of them have now run
    pub fn is_resolved(&mut self) -> bool {
        self.consumed = (self.consumed + 1).min(self.total_dependants);
        if self.consumed == self.total_dependants {
            self.consumed = 0;
            true
        } else {
            false
        }
    }

    /// Forget consumers counted so far
    pub fn reset(&mut self) {
        self.consumed = 0;
    }
}
