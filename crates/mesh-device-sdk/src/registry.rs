//! Task handler registry — maps a [`TaskKind`] to the handler that executes
//! it locally on the device.
//!
//! Grounded on `sa-node-sdk::registry::ToolRegistry`, narrowed from an
//! open string-keyed namespace (tool names like `"macos.notes.search"`) to
//! the closed `TaskKind` enum spec.md §3 defines — a device either has a
//! handler for a kind or it doesn't; there is no capability-prefix routing
//! layer because the coordinator never needs to discover new kinds at
//! runtime.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mesh_domain::job::TaskKind;
use mesh_domain::Result;

use crate::types::TaskContext;

/// Implement this to handle one [`TaskKind`] locally on a device.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn call(&self, ctx: TaskContext, input: String) -> Result<String>;
}

/// Registry of task handlers, keyed by kind.
#[derive(Clone, Default)]
pub struct TaskHandlerRegistry {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl TaskHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: TaskKind, handler: impl TaskHandler) {
        self.handlers.insert(kind, Arc::new(handler));
    }

    pub(crate) fn get(&self, kind: TaskKind) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn registered_kinds(&self) -> Vec<TaskKind> {
        self.handlers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl TaskHandler for Echo {
        async fn call(&self, _ctx: TaskContext, input: String) -> Result<String> {
            Ok(input)
        }
    }

    fn ctx() -> TaskContext {
        TaskContext {
            request_id: "r1".into(),
            task_id: "t1".into(),
            job_id: "j1".into(),
            cancel: tokio_util::sync::CancellationToken::new(),
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = TaskHandlerRegistry::new();
        reg.register(TaskKind::Echo, Echo);
        assert!(reg.get(TaskKind::Echo).is_some());
        assert!(reg.get(TaskKind::Sysinfo).is_none());
    }

    #[tokio::test]
    async fn registered_handler_executes() {
        let mut reg = TaskHandlerRegistry::new();
        reg.register(TaskKind::Echo, Echo);
        let handler = reg.get(TaskKind::Echo).unwrap();
        let result = handler.call(ctx(), "hello".into()).await.unwrap();
        assert_eq!(result, "hello");
    }
}
