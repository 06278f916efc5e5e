//! Execution strategies for resolver loads.
//!
//! Whether a load runs inline, on the blocking pool, on a blocked-on runtime
//! or as a plain `.await` depends on two facts known at call time: whether
//! the resolver's load hook is async, and whether the caller is.

use std::sync::Arc;

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, trace};

use super::{LoadContext, Resolver, ResolverError};
use crate::Item;

/// How a load is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Sync loader, sync caller: call it inline
    Direct,
    /// Sync loader, async caller: run it on the blocking pool and await it
    Offload,
    /// Async loader, sync caller: drive the future to completion
    BlockOn,
    /// Async loader, async caller: await it
    Await,
}

impl Dispatch {
    /// Picks the strategy for a loader/caller pair.
    pub fn select(is_async: bool, in_async_context: bool) -> Self {
        match (is_async, in_async_context) {
            (false, false) => Dispatch::Direct,
            (false, true) => Dispatch::Offload,
            (true, false) => Dispatch::BlockOn,
            (true, true) => Dispatch::Await,
        }
    }

    /// Whether the strategy completes without the caller awaiting
    pub fn is_blocking(&self) -> bool {
        matches!(self, Dispatch::Direct | Dispatch::BlockOn)
    }
}

/// A load ready to run: the resolver plus owned parameters.
///
/// Owning everything it needs lets the load outlive borrows of the tree,
/// which matters when it is moved to another thread or awaited.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    resolver: Arc<dyn Resolver>,
    context: LoadContext,
}

impl LoadRequest {
    /// Creates a request
    pub fn new(resolver: Arc<dyn Resolver>, context: LoadContext) -> Self {
        Self { resolver, context }
    }

    /// Type identity of the resolver
    pub fn type_name(&self) -> &str {
        self.resolver.type_name()
    }

    /// Parameters the load will see
    pub fn context(&self) -> &LoadContext {
        &self.context
    }

    pub(crate) fn context_mut(&mut self) -> &mut LoadContext {
        &mut self.context
    }

    /// Runs the load from a synchronous call site.
    pub fn run(self) -> Result<Item, ResolverError> {
        let dispatch = Dispatch::select(self.resolver.is_async(), false);
        debug!(resolver = %self.type_name(), ?dispatch, "loading resolver");
        match dispatch {
            Dispatch::BlockOn | Dispatch::Await => block_on_load(self.resolver, self.context),
            Dispatch::Direct | Dispatch::Offload => self.resolver.load(&self.context),
        }
    }

    /// Runs the load from an asynchronous call site.
    pub async fn run_async(self) -> Result<Item, ResolverError> {
        let dispatch = Dispatch::select(self.resolver.is_async(), true);
        debug!(resolver = %self.type_name(), ?dispatch, "loading resolver");
        match dispatch {
            Dispatch::Await | Dispatch::BlockOn => self.resolver.load_async(self.context).await,
            Dispatch::Offload | Dispatch::Direct => offload_load(self.resolver, self.context).await,
        }
    }
}

async fn offload_load(
    resolver: Arc<dyn Resolver>,
    context: LoadContext,
) -> Result<Item, ResolverError> {
    if Handle::try_current().is_err() {
        trace!("no tokio runtime, loading inline");
        return resolver.load(&context);
    }
    tokio::task::spawn_blocking(move || resolver.load(&context))
        .await
        .map_err(|e| ResolverError::Join(e.to_string()))?
}

fn block_on_load(resolver: Arc<dyn Resolver>, context: LoadContext) -> Result<Item, ResolverError> {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            trace!("blocking in place on the current runtime");
            tokio::task::block_in_place(|| handle.block_on(resolver.load_async(context)))
        }
        Ok(_) => {
            // A current-thread runtime cannot be blocked on from inside itself
            trace!("driving async load on a helper thread");
            std::thread::scope(|scope| {
                scope
                    .spawn(move || load_on_private_runtime(resolver, context))
                    .join()
                    .map_err(|_| ResolverError::Join("async load thread panicked".to_string()))?
            })
        }
        Err(_) => load_on_private_runtime(resolver, context),
    }
}

fn load_on_private_runtime(
    resolver: Arc<dyn Resolver>,
    context: LoadContext,
) -> Result<Item, ResolverError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ResolverError::Runtime)?;
    runtime.block_on(resolver.load_async(context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Value, resolver::AsyncFnResolver, resolver::FnResolver};

    fn sync_request() -> LoadRequest {
        let resolver = FnResolver::new("sync", |ctx| Ok(Item::from(ctx.args.len() as i64)));
        LoadRequest::new(
            Arc::new(resolver),
            LoadContext {
                args: vec![1.into(), 2.into()],
                ..Default::default()
            },
        )
    }

    fn async_request() -> LoadRequest {
        let resolver = AsyncFnResolver::new("async", |_ctx| async {
            tokio::task::yield_now().await;
            Ok(Item::from("done"))
        });
        LoadRequest::new(Arc::new(resolver), LoadContext::default())
    }

    #[test]
    fn test_strategy_table() {
        assert_eq!(Dispatch::select(false, false), Dispatch::Direct);
        assert_eq!(Dispatch::select(false, true), Dispatch::Offload);
        assert_eq!(Dispatch::select(true, false), Dispatch::BlockOn);
        assert_eq!(Dispatch::select(true, true), Dispatch::Await);
        assert!(Dispatch::BlockOn.is_blocking());
        assert!(!Dispatch::Offload.is_blocking());
    }

    #[test]
    fn test_sync_caller_without_runtime() {
        assert_eq!(sync_request().run().unwrap(), Value::Int(2));
        assert_eq!(async_request().run().unwrap(), Value::from("done"));
    }

    #[tokio::test]
    async fn test_async_caller() {
        assert_eq!(sync_request().run_async().await.unwrap(), Value::Int(2));
        assert_eq!(async_request().run_async().await.unwrap(), Value::from("done"));
    }

    #[tokio::test]
    async fn test_sync_caller_inside_current_thread_runtime() {
        assert_eq!(async_request().run().unwrap(), Value::from("done"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sync_caller_inside_multi_thread_runtime() {
        assert_eq!(async_request().run().unwrap(), Value::from("done"));
    }
}
