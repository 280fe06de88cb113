//! Reference Object Support
//!
//! Weak, soft and phantom references hold their referent without keeping it
//! alive. When a cycle finds the referent dead, the reference is cleared and,
//! if it was registered against a queue, handed to the finalizer worker for
//! enqueueing.
//!
//! Processing order inside root clearing:
//! - Soft references (aged while their referent survives)
//! - Weak references
//! - Unfinalized objects (may resurrect referents)
//! - Phantom references

/// Reference types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ReferenceType {
    /// Cleared as soon as the referent is unreachable
    Weak,
    /// Cleared at the collector's discretion
    Soft,
    /// Cleared after finalization had its chance to resurrect the referent
    Phantom,
}

impl ReferenceType {
    /// All types in root-clearing order
    pub const PROCESSING_ORDER: [ReferenceType; 3] =
        [ReferenceType::Soft, ReferenceType::Weak, ReferenceType::Phantom];

    pub fn name(self) -> &'static str {
        match self {
            ReferenceType::Weak => "weak",
            ReferenceType::Soft => "soft",
            ReferenceType::Phantom => "phantom",
        }
    }
}

/// Reference object state tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceState {
    /// Referent not yet found dead
    Initial,
    /// Referent found dead and the slot cleared
    Cleared,
    /// Delivered to its notification queue
    Enqueued,
}
