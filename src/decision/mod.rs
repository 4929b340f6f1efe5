// LLM decision recorder - side-channel record of inferred reasoning events
//
// The capture worker drives this from observed protocol traffic: tools/list
// opens a discovery session, tools/call records selection and execution,
// and the next server→host frame closes the most recently opened session.
// Every operation appends a phase-tagged record to the decision stream; the
// in-memory table only exists to stitch a session's records together.

use crate::events::{DecisionPhase, DecisionToolCall, LLMDecisionEvent};
use crate::store::{EventStore, Stream};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::VecDeque;

/// What kind of reasoning episode a session represents. Only affects the
/// synthesized id; the appended records carry the per-operation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Discovery,
    Execution,
    Initialization,
}

impl SessionKind {
    fn prefix(&self) -> &'static str {
        match self {
            SessionKind::Discovery => "discovery",
            SessionKind::Execution => "call",
            SessionKind::Initialization => "init",
        }
    }
}

/// In-memory state for one open reasoning episode.
#[derive(Debug, Clone)]
struct Session {
    decision_id: String,
    kind: SessionKind,
    started: DateTime<Utc>,
    /// Recency stamp for LRU expiry; bumped on every recorded operation.
    last_used: u64,
    user_prompt: String,
    tools_considered: Vec<String>,
    tools_selected: Vec<String>,
    reasoning: Option<String>,
    confidence: Option<f64>,
    tool_calls: Vec<DecisionToolCall>,
}

/// Records reasoning markers into the decision stream.
///
/// Sessions are kept in opened order (the closing rule wants the most
/// recently opened one); when the table is full, the least recently used
/// session is silently expired. All access is serialized through the
/// capture worker, so no internal locking is needed.
pub struct DecisionRecorder {
    store: EventStore,
    sessions: VecDeque<Session>,
    capacity: usize,
    counter: u64,
    /// Monotonic clock for `Session::last_used`.
    use_clock: u64,
}

impl DecisionRecorder {
    pub fn new(store: EventStore, capacity: usize) -> Self {
        Self {
            store,
            sessions: VecDeque::new(),
            capacity: capacity.max(1),
            counter: 0,
            use_clock: 0,
        }
    }

    /// Open a reasoning session and append its discovery record.
    ///
    /// Returns the synthesized decision id.
    pub fn begin_reasoning(
        &mut self,
        kind: SessionKind,
        user_prompt: &str,
        tools_available: &[String],
    ) -> String {
        let started = Utc::now();
        self.counter += 1;
        self.use_clock += 1;
        let decision_id = format!(
            "{}_{}_{}",
            kind.prefix(),
            started.timestamp_millis(),
            self.counter
        );

        let session = Session {
            decision_id: decision_id.clone(),
            kind,
            started,
            last_used: self.use_clock,
            user_prompt: user_prompt.to_string(),
            tools_considered: tools_available.to_vec(),
            tools_selected: Vec::new(),
            reasoning: None,
            confidence: None,
            tool_calls: Vec::new(),
        };

        // LRU: expire the least recently used session when the table is full
        if self.sessions.len() >= self.capacity {
            let lru = self
                .sessions
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.last_used)
                .map(|(i, _)| i);
            if let Some(expired) = lru.and_then(|i| self.sessions.remove(i)) {
                tracing::debug!("expiring decision session {}", expired.decision_id);
            }
        }
        self.sessions.push_back(session);

        self.persist(&decision_id, DecisionPhase::Discovery, None, None);
        tracing::debug!("started reasoning session {}", decision_id);
        decision_id
    }

    /// Record the tools the LLM settled on.
    pub fn record_selection(
        &mut self,
        decision_id: &str,
        tools_selected: Vec<String>,
        reasoning: Option<String>,
        confidence: Option<f64>,
    ) {
        self.use_clock += 1;
        let stamp = self.use_clock;
        let Some(session) = self.session_mut(decision_id) else {
            tracing::warn!("unknown decision id: {}", decision_id);
            return;
        };
        session.last_used = stamp;
        session.tools_selected = tools_selected;
        session.reasoning = reasoning;
        session.confidence = confidence;

        self.persist(decision_id, DecisionPhase::ToolSelection, None, None);
    }

    /// Record an actual tool invocation inside a session.
    pub fn record_tool_call(
        &mut self,
        decision_id: &str,
        tool_name: &str,
        tool_args: Value,
        timestamp: Option<DateTime<Utc>>,
    ) {
        self.use_clock += 1;
        let stamp = self.use_clock;
        let Some(session) = self.session_mut(decision_id) else {
            tracing::warn!("unknown decision id: {}", decision_id);
            return;
        };
        session.last_used = stamp;
        let call = DecisionToolCall {
            tool_name: tool_name.to_string(),
            arguments: tool_args,
            timestamp: timestamp.unwrap_or_else(Utc::now),
            call_id: format!("{}_{}", tool_name, session.tool_calls.len()),
        };
        session.tool_calls.push(call);

        self.persist(decision_id, DecisionPhase::ToolCall, None, None);
    }

    /// Close a session, recording elapsed processing time and the outcome.
    pub fn complete(&mut self, decision_id: &str, success: bool, final_reasoning: Option<String>) {
        let Some(pos) = self
            .sessions
            .iter()
            .position(|s| s.decision_id == decision_id)
        else {
            tracing::warn!("unknown decision id: {}", decision_id);
            return;
        };

        let Some(mut session) = self.sessions.remove(pos) else {
            return;
        };
        if let Some(extra) = final_reasoning {
            let base = session.reasoning.take().unwrap_or_default();
            session.reasoning = Some(if base.is_empty() {
                extra
            } else {
                format!("{base}\n[Final] {extra}")
            });
        }

        let processing_time_ms = (Utc::now() - session.started).num_milliseconds();
        self.persist_session(
            &session,
            DecisionPhase::Completion,
            Some(processing_time_ms),
            Some(success),
        );

        tracing::debug!(
            "completed decision {} in {}ms (success: {})",
            decision_id,
            processing_time_ms,
            success
        );
    }

    /// The most recently opened session still awaiting completion.
    pub fn most_recent_open(&self) -> Option<String> {
        self.sessions.back().map(|s| s.decision_id.clone())
    }

    /// An open discovery session not yet carrying a tool call, if any.
    /// A tools/call arriving on the wire attaches here instead of opening a
    /// fresh session.
    pub fn open_discovery(&self) -> Option<String> {
        self.sessions
            .iter()
            .rev()
            .find(|s| s.kind == SessionKind::Discovery && s.tool_calls.is_empty())
            .map(|s| s.decision_id.clone())
    }

    pub fn open_session_count(&self) -> usize {
        self.sessions.len()
    }

    fn session_mut(&mut self, decision_id: &str) -> Option<&mut Session> {
        self.sessions
            .iter_mut()
            .find(|s| s.decision_id == decision_id)
    }

    /// Append one phase-tagged record reflecting the session's current state.
    fn persist(
        &self,
        decision_id: &str,
        phase: DecisionPhase,
        processing_time_ms: Option<i64>,
        success: Option<bool>,
    ) {
        let Some(session) = self.sessions.iter().find(|s| s.decision_id == decision_id) else {
            return;
        };
        self.persist_session(session, phase, processing_time_ms, success);
    }

    fn persist_session(
        &self,
        session: &Session,
        phase: DecisionPhase,
        processing_time_ms: Option<i64>,
        success: Option<bool>,
    ) {
        let event = LLMDecisionEvent {
            timestamp: Utc::now(),
            decision_id: session.decision_id.clone(),
            phase,
            user_prompt: session.user_prompt.clone(),
            tools_considered: session.tools_considered.clone(),
            tools_selected: session.tools_selected.clone(),
            tool_calls: session.tool_calls.clone(),
            reasoning: session.reasoning.clone(),
            confidence: session.confidence,
            processing_time_ms,
            success,
        };

        if let Err(e) = self.store.append(Stream::LlmDecisionTrace, &event) {
            // Capture-side failure: log and keep going, never surface
            tracing::error!("failed to persist decision record: {}", e);
        }
    }
}
