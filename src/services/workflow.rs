//! Workflow engine: Sequential and Parallel action scheduling
//!
//! A failing action is reported through the failure hub and never
//! aborts its siblings or the surrounding journey. Once a parallel
//! workflow is triggered there is no mechanism to recall actions that
//! have not started yet.

use crate::domain::workflow::{Action, ExecutionMode, Workflow};
use crate::infra::events::EventHub;
use crate::services::actions::{self, ExecutionContext};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Notification published when an action fails. Carries enough context
/// to show the user a discrete error without interrupting the rest of
/// the station's scripted behavior.
#[derive(Debug, Clone)]
pub struct ActionFailure {
    pub workflow_id: Uuid,
    pub action_id: Uuid,
    pub action_name: String,
    pub error: String,
}

#[derive(Clone, Default)]
pub struct WorkflowEngine {
    failures: EventHub<ActionFailure>,
}

impl WorkflowEngine {
    pub fn new() -> Self {
        Self { failures: EventHub::new() }
    }

    /// Action failure notifications for all workflows run by this engine.
    pub fn failures(&self) -> &EventHub<ActionFailure> {
        &self.failures
    }

    /// Run a workflow to completion under its configured mode.
    pub async fn execute(&self, workflow: &Workflow, context: &ExecutionContext) {
        debug!(
            workflow = %workflow.name,
            mode = workflow.mode.as_str(),
            actions = workflow.actions.len(),
            "workflow_started"
        );

        match workflow.mode {
            ExecutionMode::Sequential => {
                self.run_sequential(workflow.id, &workflow.actions, context).await
            }
            ExecutionMode::Parallel => {
                self.run_parallel(workflow.id, &workflow.actions, context).await
            }
        }

        info!(workflow = %workflow.name, "workflow_completed");
    }

    /// Strict list order; each action's delay is waited out after it
    /// completes (including failure handling) and before the next starts.
    async fn run_sequential(
        &self,
        workflow_id: Uuid,
        actions: &[Action],
        context: &ExecutionContext,
    ) {
        for action in actions {
            self.run_action(workflow_id, action, context, ExecutionMode::Sequential).await;
            if action.delay_after_ms > 0 {
                tokio::time::sleep(Duration::from_millis(action.delay_after_ms)).await;
            }
        }
    }

    /// Every action is scheduled independently; delays accumulate into
    /// start offsets from workflow start. Resolves when all actions
    /// (and their subtrees) have finished.
    async fn run_parallel(&self, workflow_id: Uuid, actions: &[Action], context: &ExecutionContext) {
        let mut tasks = JoinSet::new();

        for (action, offset_ms) in actions.iter().zip(parallel_offsets(actions)) {
            let engine = self.clone();
            let action = action.clone();
            let context = context.clone();

            tasks.spawn(async move {
                if offset_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(offset_ms)).await;
                }
                engine.run_action(workflow_id, &action, &context, ExecutionMode::Parallel).await;
            });
        }

        while tasks.join_next().await.is_some() {}
    }

    /// Execute one action and then its children with the parent's mode
    /// semantics. Failures are published and isolated here.
    fn run_action<'a>(
        &'a self,
        workflow_id: Uuid,
        action: &'a Action,
        context: &'a ExecutionContext,
        mode: ExecutionMode,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if let Err(e) = actions::execute(action, context).await {
                warn!(action = %action.name, error = %e, "action_failed");
                self.failures.publish(&ActionFailure {
                    workflow_id,
                    action_id: action.id,
                    action_name: action.name.clone(),
                    error: e.to_string(),
                });
            }

            if action.children.is_empty() {
                return;
            }

            match mode {
                ExecutionMode::Sequential => {
                    self.run_sequential(workflow_id, &action.children, context).await
                }
                ExecutionMode::Parallel => {
                    self.run_parallel(workflow_id, &action.children, context).await
                }
            }
        })
    }
}

/// Start offsets for parallel scheduling: each action's delay
/// contributes to the running offset from workflow start.
pub(crate) fn parallel_offsets(actions: &[Action]) -> Vec<u64> {
    let mut offset = 0u64;
    actions
        .iter()
        .map(|action| {
            offset += action.delay_after_ms;
            offset
        })
        .collect()
}
