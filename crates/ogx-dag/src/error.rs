//! Error types for traversal and hierarchy bookkeeping.

/// Errors that can occur while walking an object graph or recording its
/// hierarchy.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    /// A key was already recorded with a different value in this pass.
    #[error("conflicting {map} entry for {object}: recorded {existing}, got {new}")]
    Conflict {
        /// Which mapping was violated (`parent`, `node`, `unit`).
        map: &'static str,
        /// The object the mapping is about.
        object: String,
        existing: String,
        new: String,
    },

    /// The graph links an object back to one of its ancestors.
    #[error("cycle detected: {path}")]
    CycleDetected {
        /// The offending edge chain, ancestor first.
        path: String,
    },
}

/// Convenience alias for traversal and hierarchy results.
pub type DagResult<T> = Result<T, DagError>;
