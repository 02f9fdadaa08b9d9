//! The contract every backward-filter strategy implements, plus the derived
//! selection predicates callers compose when picking one.

use crate::args::{ExecArgs, SizeArgs, Workspace};
use crate::error::{ConvGradError, Result};

pub trait ConvGradAlgo: Send + Sync {
    /// Stable identity, used in logs, error messages and persisted choices.
    fn name(&self) -> &'static str;

    /// Cheap, local feasibility check. Never allocates device memory and never
    /// triggers the vendor discovery path; that is confined to
    /// [`workspace_in_bytes`](Self::workspace_in_bytes).
    fn is_available(&self, args: &SizeArgs) -> bool;

    /// Scratch bytes the strategy needs for this problem. May be expensive on
    /// the first query for vendor-backed strategies; repeated queries with an
    /// equal descriptor return the cached value.
    fn workspace_in_bytes(&self, args: &SizeArgs) -> Result<usize>;

    /// Run the computation, writing the filter gradient. The caller must have
    /// checked availability; workspace sufficiency is re-verified and fails
    /// fast with [`ConvGradError::WorkspaceTooSmall`].
    fn exec(&self, args: &ExecArgs) -> Result<()>;

    /// Whether repeated execution on identical inputs is bit-identical.
    fn is_reproducible(&self) -> bool;

    /// Whether this strategy delegates to the external vendor library.
    fn is_vendor(&self) -> bool {
        false
    }

    /// Available and fits under `limit` workspace bytes. Pass `usize::MAX`
    /// for an unconstrained budget.
    fn is_available_within_budget(&self, args: &SizeArgs, limit: usize) -> bool {
        self.is_available(args)
            && self
                .workspace_in_bytes(args)
                .map_or(false, |bytes| bytes <= limit)
    }

    /// Budget check plus an optional reproducibility requirement.
    fn is_available_reproducible(
        &self,
        args: &SizeArgs,
        reproducible: bool,
        limit: usize,
    ) -> bool {
        (!reproducible || self.is_reproducible()) && self.is_available_within_budget(args, limit)
    }

    /// Contract check run at the top of every exec: the provided workspace
    /// must cover the reported requirement.
    fn check_workspace(&self, args: &SizeArgs, workspace: &Workspace) -> Result<()> {
        let required = self.workspace_in_bytes(args)?;
        if workspace.size < required {
            return Err(ConvGradError::WorkspaceTooSmall {
                algo: self.name(),
                required,
                provided: workspace.size,
            });
        }
        Ok(())
    }
}
