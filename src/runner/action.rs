//! Task actions
//!
//! An action is the body of a non-group task. Recipes loaded from YAML use
//! [`ScriptAction`](crate::runner::ScriptAction); code can register any type
//! implementing [`Action`], or a plain closure through [`FnAction`].

use crate::error::ExecutionResult;
use crate::runner::Context;
use async_trait::async_trait;

/// Work executed by a task on one host
#[async_trait]
pub trait Action: Send + Sync {
    async fn run(&self, ctx: &mut Context) -> ExecutionResult<()>;
}

/// Action backed by a synchronous closure
///
/// Useful for tasks that only read or write configuration.
pub struct FnAction<F> {
    f: F,
}

impl<F> FnAction<F>
where
    F: Fn(&mut Context) -> anyhow::Result<()> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        FnAction { f }
    }
}

#[async_trait]
impl<F> Action for FnAction<F>
where
    F: Fn(&mut Context) -> anyhow::Result<()> + Send + Sync + 'static,
{
    async fn run(&self, ctx: &mut Context) -> ExecutionResult<()> {
        (self.f)(ctx).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutionError;
    use crate::host::{Host, HostConfig, Store};
    use crate::runner::ProcessRunner;
    use std::sync::Arc;

    fn context() -> Context {
        let host = Arc::new(Host::localhost("local"));
        let config = Arc::new(HostConfig::new(host, Arc::new(Store::new())));
        Context::new(config, Arc::new(ProcessRunner::new()))
    }

    #[tokio::test]
    async fn test_fn_action_sets_config() {
        let action = FnAction::new(|ctx| {
            ctx.set("release_name", "42");
            Ok(())
        });
        let mut ctx = context();

        action.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.get_string("release_name").unwrap(), "42");
    }

    #[tokio::test]
    async fn test_fn_action_error() {
        let action = FnAction::new(|_| anyhow::bail!("stage is not allowed"));
        let mut ctx = context();

        assert_eq!(
            action.run(&mut ctx).await,
            Err(ExecutionError::Action("stage is not allowed".to_string()))
        );
    }

    #[tokio::test]
    async fn test_fn_action_keeps_execution_error() {
        let action = FnAction::new(|ctx| {
            ctx.get("deploy_path")?;
            Ok(())
        });
        let mut ctx = context();

        assert_eq!(
            action.run(&mut ctx).await,
            Err(ExecutionError::MissingConfig("deploy_path".to_string()))
        );
    }
}
