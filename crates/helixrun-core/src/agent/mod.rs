//! Executable agents.
//!
//! An [`Agent`] is a closed set of variants built from an
//! [`AgentSpec`](crate::domain::AgentSpec). Every variant runs against an
//! [`Invocation`] and pushes [`ExecutionEvent`]s into an [`EventSink`].

pub mod builder;
pub mod chain;
pub mod graph;
pub mod llm;
pub mod registry;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use helixrun_state::SessionKey;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{AgentKind, EventOrigin, ExecutionError, ExecutionEvent, Message, Usage};

pub use builder::AgentBuilder;
pub use chain::ChainAgent;
pub use graph::GraphAgent;
pub use llm::{LlmAgent, MAX_MODEL_CALLS};
pub use registry::AgentRegistry;

/// Input and correlation context for one agent run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub origin: EventOrigin,
    pub session: SessionKey,
    /// Prior conversation, oldest first.
    pub history: Vec<Message>,
    pub message: String,
}

impl Invocation {
    pub fn new(
        author: impl Into<String>,
        request_id: impl Into<String>,
        session: SessionKey,
        history: Vec<Message>,
        message: impl Into<String>,
    ) -> Self {
        let author = author.into();
        Self {
            origin: EventOrigin {
                filter_key: author.clone(),
                author,
                request_id: request_id.into(),
                invocation_id: Uuid::new_v4().to_string(),
                parent_invocation_id: None,
            },
            session,
            history,
            message: message.into(),
        }
    }

    /// Nested invocation for a sub-agent, linked through the parent id.
    pub fn child(&self, author: &str, message: impl Into<String>) -> Self {
        Self {
            origin: EventOrigin {
                author: author.to_string(),
                request_id: self.origin.request_id.clone(),
                invocation_id: Uuid::new_v4().to_string(),
                parent_invocation_id: Some(self.origin.invocation_id.clone()),
                filter_key: format!("{}/{}", self.origin.filter_key, author),
            },
            session: self.session.clone(),
            history: self.history.clone(),
            message: message.into(),
        }
    }
}

/// Final result of an agent run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentOutput {
    pub content: String,
    pub usage: Usage,
}

/// Producer end of the event channel.
///
/// Every send and every guarded future races the cancellation token, so a
/// cancelled run stops at its next suspension point.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ExecutionEvent>,
    cancel: CancellationToken,
    emitted: Arc<AtomicU64>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<ExecutionEvent>, cancel: CancellationToken) -> Self {
        Self {
            tx,
            cancel,
            emitted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Bounded channel plus its sink; the receiver side is returned as-is.
    pub fn channel(
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<ExecutionEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx, cancel), rx)
    }

    pub async fn emit(&self, event: ExecutionEvent) -> Result<(), ExecutionError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExecutionError::Cancelled),
            sent = self.tx.send(event) => {
                sent.map_err(|_| ExecutionError::Cancelled)?;
                self.emitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    /// Events delivered to the channel so far.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Await `fut` unless the run is cancelled first.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, ExecutionError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExecutionError::Cancelled),
            out = fut => Ok(out),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

/// A built, runnable agent. Each value is independent of every other.
#[derive(Debug)]
pub enum Agent {
    Single(LlmAgent),
    Chain(ChainAgent),
    Graph(GraphAgent),
}

impl Agent {
    pub fn name(&self) -> &str {
        match self {
            Self::Single(a) => a.name(),
            Self::Chain(a) => a.name(),
            Self::Graph(a) => a.name(),
        }
    }

    pub fn kind(&self) -> AgentKind {
        match self {
            Self::Single(_) => AgentKind::Single,
            Self::Chain(_) => AgentKind::Chain,
            Self::Graph(_) => AgentKind::Graph,
        }
    }

    /// Completed runs of this instance.
    pub fn runs(&self) -> u64 {
        match self {
            Self::Single(a) => a.runs.load(Ordering::Relaxed),
            Self::Chain(a) => a.runs.load(Ordering::Relaxed),
            Self::Graph(a) => a.runs.load(Ordering::Relaxed),
        }
    }

    pub async fn run(
        &self,
        invocation: &Invocation,
        sink: &EventSink,
    ) -> Result<AgentOutput, ExecutionError> {
        let (output, runs) = match self {
            Self::Single(a) => (a.run(invocation, sink).await, &a.runs),
            Self::Chain(a) => (a.run(invocation, sink).await, &a.runs),
            Self::Graph(a) => (a.run(invocation, sink).await, &a.runs),
        };
        if output.is_ok() {
            runs.fetch_add(1, Ordering::Relaxed);
        }
        output
    }
}

pub(crate) type RunCounter = AtomicU64;
