//! Execution engine.
//!
//! [`ExecutionEngine::run`] builds a fresh agent, resolves the session and
//! spawns one producer task that drives the agent. The caller consumes the
//! returned [`EventStream`]; dropping it cancels the producer. A producer
//! panic still ends the stream with one error event.

use std::any::Any;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::Stream;
use helixrun_state::{Session, SessionKey, SessionStore, SessionTurn, TurnRole};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, warn, Instrument};
use uuid::Uuid;

use crate::agent::{Agent, AgentOutput, AgentRegistry, EventSink, Invocation};
use crate::domain::{
    object, EventOrigin, ExecutionError, ExecutionEvent, HelixError, Message, ModelResponse,
};
use crate::metrics::METRICS;
use crate::obs;

pub const DEFAULT_RUNNER_NAME: &str = "helixrun";
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;
pub const ANONYMOUS_USER: &str = "anonymous";

/// One chat turn to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub agent_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl RunRequest {
    pub fn new(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            message: message.into(),
            user_id: None,
            session_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Drives agents and streams their events.
#[derive(Clone)]
pub struct ExecutionEngine {
    registry: Arc<AgentRegistry>,
    sessions: Arc<dyn SessionStore>,
    runner_name: String,
}

impl ExecutionEngine {
    pub fn new(registry: Arc<AgentRegistry>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            registry,
            sessions,
            runner_name: DEFAULT_RUNNER_NAME.to_string(),
        }
    }

    pub fn with_runner_name(mut self, name: impl Into<String>) -> Self {
        self.runner_name = name.into();
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn runner_name(&self) -> &str {
        &self.runner_name
    }

    /// Start a run. Build and session failures are returned before any
    /// event is produced; everything after that arrives on the stream.
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, HelixError> {
        let user_id = request
            .user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| ANONYMOUS_USER.to_string());
        let session_id = request.session_id.filter(|s| !s.trim().is_empty());

        let agent = self.registry.build(&request.agent_id)?;
        let session = self
            .sessions
            .get_or_create(&self.runner_name, &user_id, session_id.as_deref())
            .await?;

        let request_id = Uuid::new_v4().to_string();
        let token = cancel.child_token();
        let (sink, rx) = EventSink::channel(DEFAULT_CHANNEL_CAPACITY, token.clone());
        let origin = EventOrigin {
            author: self.runner_name.clone(),
            request_id: request_id.clone(),
            invocation_id: Uuid::new_v4().to_string(),
            parent_invocation_id: None,
            filter_key: format!("{}/{}", self.runner_name, agent.name()),
        };

        let supervisor = Supervisor {
            sink: sink.clone(),
            origin: origin.clone(),
        };
        let producer = Producer {
            agent,
            sessions: Arc::clone(&self.sessions),
            origin,
            user_id,
            key: session.key.clone(),
            message: request.message,
            sink,
        };
        let span = obs::span(&request_id, &request.agent_id);
        let handle = tokio::spawn(producer.drive().instrument(span.clone()));
        tokio::spawn(supervisor.watch(handle).instrument(span));

        Ok(EventStream {
            rx,
            request_id,
            session: session.key,
            cancel: token.clone(),
            _guard: token.drop_guard(),
        })
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("agents", &self.registry.len())
            .field("runner_name", &self.runner_name)
            .finish()
    }
}

/// The producer half of one run.
struct Producer {
    agent: Agent,
    sessions: Arc<dyn SessionStore>,
    /// Runner-level identity stamped on the completion and error events.
    origin: EventOrigin,
    user_id: String,
    key: SessionKey,
    message: String,
    sink: EventSink,
}

impl Producer {
    async fn drive(self) {
        let started = Instant::now();
        METRICS.inc_runs_started();
        obs::emit_run_started(&self.origin.request_id, self.agent.name(), &self.key.to_string());

        let success = match self.execute().await {
            Ok(()) => true,
            Err(ExecutionError::Cancelled) => {
                debug!("run cancelled");
                false
            }
            Err(err) => {
                METRICS.inc_runs_failed();
                warn!(error = %err, "run failed");
                let event = ExecutionEvent::error(&self.origin, err.kind(), err.to_string());
                if self.sink.emit(event).await.is_err() {
                    debug!("consumer gone before error event");
                }
                false
            }
        };

        obs::emit_run_finished(
            &self.origin.request_id,
            started.elapsed().as_millis() as u64,
            self.sink.emitted(),
            success,
        );
    }

    /// The session lease is held until the turns are stored.
    async fn execute(&self) -> Result<(), ExecutionError> {
        let lease = self.sink.guard(self.sessions.lock(&self.key)).await??;
        let session = self.sessions.get(&self.key).await?;

        let mut invocation = Invocation::new(
            self.agent.name(),
            &self.origin.request_id,
            self.key.clone(),
            history(&session),
            &self.message,
        );
        invocation.origin.invocation_id = self.origin.invocation_id.clone();
        invocation.origin.filter_key = self.origin.filter_key.clone();

        let output = self.agent.run(&invocation, &self.sink).await?;

        let turns = vec![
            SessionTurn::user(&self.user_id, &self.message, &self.origin.invocation_id),
            SessionTurn::assistant(
                self.agent.name(),
                &output.content,
                &self.origin.invocation_id,
            ),
        ];
        self.sessions.append_turns(&self.key, turns).await?;
        drop(lease);

        self.sink
            .emit(completion_event(&self.origin, self.agent.name(), output))
            .await
    }
}

/// Watches a producer task. A panic in the producer skips its own error
/// handling, so the terminal error event is sent from here instead.
struct Supervisor {
    sink: EventSink,
    origin: EventOrigin,
}

impl Supervisor {
    async fn watch(self, handle: JoinHandle<()>) {
        let Err(join_err) = handle.await else {
            return;
        };
        if !join_err.is_panic() {
            return;
        }

        METRICS.inc_runs_failed();
        let err = ExecutionError::Internal(panic_message(join_err.into_panic()));
        error!(error = %err, "run producer panicked");
        let event = ExecutionEvent::error(&self.origin, err.kind(), err.to_string());
        if self.sink.emit(event).await.is_err() {
            debug!("consumer gone before panic error event");
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        return (*text).to_string();
    }
    match payload.downcast::<String>() {
        Ok(text) => *text,
        Err(_) => "agent task panicked".to_string(),
    }
}

fn history(session: &Session) -> Vec<Message> {
    session
        .turns
        .iter()
        .map(|turn| match turn.role {
            TurnRole::User => Message::user(&turn.content),
            TurnRole::Assistant => Message::assistant(&turn.content),
        })
        .collect()
}

/// The single event that ends a successful run. It carries the agent's
/// final output and the usage summed over every model call.
fn completion_event(origin: &EventOrigin, agent: &str, output: AgentOutput) -> ExecutionEvent {
    let mut response = ModelResponse::complete(
        origin.invocation_id.clone(),
        agent,
        Message::assistant(output.content),
        Some(output.usage),
    );
    response.object = object::RUNNER_COMPLETION.to_string();
    ExecutionEvent::from_response(origin, response)
}

/// Ordered events of one run.
///
/// Ends after the completion or error event. Dropping it cancels the run.
pub struct EventStream {
    rx: mpsc::Receiver<ExecutionEvent>,
    request_id: String,
    session: SessionKey,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl EventStream {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn session(&self) -> &SessionKey {
        &self.session
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Stream for EventStream {
    type Item = ExecutionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("request_id", &self.request_id)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
