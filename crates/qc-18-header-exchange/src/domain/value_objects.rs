//! # Value Objects
//!
//! Request modes and exchange lifecycle.

use shared_types::Hash;

/// Height value on the wire meaning "current head".
pub const HEAD_HEIGHT_SENTINEL: u64 = 0;

/// The effective lookup a request resolves to.
///
/// Precedence on the wire: hash present, then head sentinel, then height.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestMode {
    /// Header at the highest known height.
    Head,
    /// Header with the given content hash.
    Hash(Hash),
    /// `amount` consecutive headers starting at `from`.
    Height {
        /// First height
        from: u64,
        /// Number of headers, at least 1
        amount: u64,
    },
}

impl RequestMode {
    /// Number of response messages a successful request yields.
    pub fn expected_responses(&self) -> u64 {
        match self {
            Self::Head | Self::Hash(_) => 1,
            Self::Height { amount, .. } => *amount,
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Hash(_) => "hash",
            Self::Height { amount: 1, .. } => "height",
            Self::Height { .. } => "range",
        }
    }
}

/// Exchange lifecycle: Created -> Running -> Stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// Built but not started.
    #[default]
    Created,
    /// Handlers registered.
    Running,
    /// Torn down; cannot be restarted.
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_responses() {
        assert_eq!(RequestMode::Head.expected_responses(), 1);
        assert_eq!(RequestMode::Hash([0u8; 32]).expected_responses(), 1);
        assert_eq!(
            RequestMode::Height { from: 3, amount: 4 }.expected_responses(),
            4
        );
    }

    #[test]
    fn test_labels() {
        assert_eq!(RequestMode::Height { from: 1, amount: 1 }.label(), "height");
        assert_eq!(RequestMode::Height { from: 1, amount: 2 }.label(), "range");
    }
}
