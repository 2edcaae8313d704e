//! Rewrite configuration.

/// Knobs for [`rewrite_with`](crate::rewrite_with).
///
/// Verification walks the whole graph, so it defaults to on in debug
/// builds only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Check the producer's invariants before the pass starts.
    pub verify_input: bool,
    /// Check the result before handing it back.
    pub verify_output: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        RewriteOptions {
            verify_input: cfg!(debug_assertions),
            verify_output: cfg!(debug_assertions),
        }
    }
}

impl RewriteOptions {
    /// Verify both sides regardless of build profile.
    pub fn checked() -> Self {
        RewriteOptions {
            verify_input: true,
            verify_output: true,
        }
    }

    /// Skip all verification.
    pub fn unchecked() -> Self {
        RewriteOptions {
            verify_input: false,
            verify_output: false,
        }
    }
}
