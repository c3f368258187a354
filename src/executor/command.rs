use crate::error::CommandResult;

use async_trait::async_trait;

/// A single-shot unit of storage work.
///
/// Taking `self` by value makes "executed at most once" a property of the type: the
/// queue moves the command into its job and it is consumed by `execute`.
#[async_trait]
pub trait StorageCommand: Send + 'static {
    type Output: Send + 'static;

    /// Short label used in logs.
    fn name(&self) -> &'static str;

    async fn execute(self) -> CommandResult<Self::Output>;
}
