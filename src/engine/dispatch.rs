use crate::engine::{DiscoveryReport, ReconciliationEngine};
use crate::models::ValidationError;
use crate::services::policy_store::CommandRunner;
use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Work the coordinator can hand to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    AutoDiscover,
    AddGame {
        name: String,
        app_path: String,
        marking: i64,
    },
    Edit {
        name: String,
        marking: i64,
    },
    Remove {
        name: String,
    },
    RemoveAll,
    SetDefault {
        value: i64,
    },
}

/// What an [`Action`] produced.
#[derive(Debug)]
pub enum ActionOutcome {
    Discovered(DiscoveryReport),

    /// A create/replace finished; `true` when the store confirmed the policy
    Applied(bool),

    Removed(bool),

    /// Number of policies deleted by a remove-all
    RemovedAll(usize),

    DefaultSet,

    /// Arguments were invalid; nothing was changed
    Rejected(ValidationError),
}

struct Job {
    action: Action,
    reply: oneshot::Sender<ActionOutcome>,
}

/// Cheap, cloneable submission side of a [`Dispatcher`].
#[derive(Clone)]
pub struct DispatcherHandle {
    jobs: mpsc::Sender<Job>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl DispatcherHandle {
    /// Queue an action. The receiver resolves once the action has run.
    pub async fn submit(&self, action: Action) -> Result<oneshot::Receiver<ActionOutcome>> {
        let (reply, outcome) = oneshot::channel();
        self.jobs
            .send(Job { action, reply })
            .await
            .map_err(|_| anyhow!("Dispatcher is no longer accepting work"))?;
        Ok(outcome)
    }

    /// Queue an action and wait for its outcome.
    pub async fn run(&self, action: Action) -> Result<ActionOutcome> {
        let outcome = self.submit(action).await?;
        outcome.await.context("Action was dropped before completing")
    }

    /// Stop accepting work. Actions already started run to completion.
    pub fn shutdown(&self) {
        tracing::info!("Dispatcher shutdown requested");
        let _ = self.shutdown.send(true);
    }
}

/// Receives actions from a queue and runs each one on its own task.
///
/// There is no cap on concurrent actions; operations on the same game name are
/// serialized inside the engine.
pub struct Dispatcher<R: CommandRunner + 'static> {
    engine: Arc<ReconciliationEngine<R>>,
    jobs: mpsc::Receiver<Job>,
    shutdown: watch::Receiver<bool>,
}

impl<R: CommandRunner + 'static> Dispatcher<R> {
    /// # Arguments
    /// * `engine` - Engine shared by every spawned action
    /// * `capacity` - Queue depth before `submit` waits
    pub fn new(engine: Arc<ReconciliationEngine<R>>, capacity: usize) -> (Self, DispatcherHandle) {
        let (jobs_tx, jobs_rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let dispatcher = Self {
            engine,
            jobs: jobs_rx,
            shutdown: shutdown_rx,
        };
        let handle = DispatcherHandle {
            jobs: jobs_tx,
            shutdown: Arc::new(shutdown_tx),
        };
        (dispatcher, handle)
    }

    /// Run until shutdown is requested or every handle is dropped.
    pub async fn run(mut self) {
        tracing::info!("Dispatcher started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let job = tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                job = self.jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let engine = Arc::clone(&self.engine);
            tokio::spawn(async move {
                tracing::debug!("Running action: {:?}", job.action);
                let outcome = execute(&engine, job.action).await;
                if job.reply.send(outcome).is_err() {
                    tracing::debug!("Action outcome discarded; submitter went away");
                }
            });
        }

        tracing::info!("Dispatcher stopped");
    }
}

async fn execute<R: CommandRunner>(engine: &ReconciliationEngine<R>, action: Action) -> ActionOutcome {
    let result = match action {
        Action::AutoDiscover => Ok(ActionOutcome::Discovered(engine.auto_discover_and_add().await)),
        Action::AddGame {
            name,
            app_path,
            marking,
        } => engine
            .add_game(&name, &app_path, marking)
            .await
            .map(ActionOutcome::Applied),
        Action::Edit { name, marking } => engine.edit(&name, marking).await.map(ActionOutcome::Applied),
        Action::Remove { name } => Ok(ActionOutcome::Removed(engine.remove(&name).await)),
        Action::RemoveAll => Ok(ActionOutcome::RemovedAll(engine.remove_all().await)),
        Action::SetDefault { value } => engine.set_default(value).map(|()| ActionOutcome::DefaultSet),
    };

    result.unwrap_or_else(|e| {
        tracing::warn!("Rejected action: {}", e);
        ActionOutcome::Rejected(e)
    })
}
