// src/session.rs
//! Per-user session state: chat history, uploads, cached analysis results and
//! pipeline progress. Sessions are isolated from each other; each one owns
//! its own locks.

use crate::models::{AnalysisResult, ChatMessage, ChatState, UploadedFile};
use crate::pipeline::{PipelineError, ProgressChannel, ProgressSink, ProgressUpdate};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, OnceCell, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub type SessionId = String;

pub const WELCOME_MESSAGE: &str = "Add a file to get started";
pub const CHAT_GREETING: &str = "Hi! Do you have any questions about the analyzed recording?";

type AnalysisCell = Arc<OnceCell<Arc<AnalysisResult>>>;

pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    state: RwLock<SessionState>,
    /// FIFO gate that serializes chat questions within the session.
    chat_gate: Mutex<()>,
    awaiting_response: AtomicBool,
    progress: ProgressChannel,
    cancel: CancellationToken,
}

struct SessionState {
    messages: Vec<ChatMessage>,
    chat_messages: Vec<ChatMessage>,
    uploads: HashMap<String, UploadedFile>,
    analyses: HashMap<String, AnalysisCell>,
    active_file: Option<String>,
    last_active_at: DateTime<Utc>,
}

/// Serializable view of a session for the UI.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
    pub file_processed: bool,
    pub active_file: Option<UploadedFile>,
    pub chat_messages: Vec<ChatMessage>,
    pub chat_state: ChatState,
    pub progress: Option<ProgressUpdate>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            state: RwLock::new(SessionState {
                messages: vec![ChatMessage::assistant(WELCOME_MESSAGE)],
                chat_messages: vec![ChatMessage::assistant(CHAT_GREETING)],
                uploads: HashMap::new(),
                analyses: HashMap::new(),
                active_file: None,
                last_active_at: now,
            }),
            chat_gate: Mutex::new(()),
            awaiting_response: AtomicBool::new(false),
            progress: ProgressChannel::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn touch(&self) {
        self.state.write().await.last_active_at = Utc::now();
    }

    pub async fn last_active_at(&self) -> DateTime<Utc> {
        self.state.read().await.last_active_at
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        let active_file = state
            .active_file
            .as_ref()
            .and_then(|key| state.uploads.get(key))
            .cloned();
        let file_processed = state
            .active_file
            .as_ref()
            .and_then(|key| state.analyses.get(key))
            .map(|cell| cell.initialized())
            .unwrap_or(false);

        SessionSnapshot {
            session_id: self.id.clone(),
            created_at: self.created_at,
            messages: state.messages.clone(),
            file_processed,
            active_file,
            chat_messages: state.chat_messages.clone(),
            chat_state: self.chat_state(),
            progress: self.progress.latest(),
        }
    }

    /// Record an upload and make it the active file. If the same bytes were
    /// already uploaded in this session, the earlier record is kept and
    /// returned with `true`.
    pub async fn register_upload(&self, file: UploadedFile) -> (UploadedFile, bool) {
        let mut state = self.state.write().await;
        let key = file.id.clone();
        state.active_file = Some(key.clone());
        state.last_active_at = Utc::now();

        match state.uploads.get(&key) {
            Some(existing) => (existing.clone(), true),
            None => {
                state.uploads.insert(key, file.clone());
                (file, false)
            }
        }
    }

    pub async fn find_upload_by_content(&self, key: &str) -> Option<UploadedFile> {
        self.state.read().await.uploads.get(key).cloned()
    }

    pub async fn active_upload(&self) -> Option<UploadedFile> {
        let state = self.state.read().await;
        state
            .active_file
            .as_ref()
            .and_then(|key| state.uploads.get(key))
            .cloned()
    }

    pub async fn uploads(&self) -> Vec<UploadedFile> {
        self.state.read().await.uploads.values().cloned().collect()
    }

    pub async fn cached_analysis(&self, key: &str) -> Option<Arc<AnalysisResult>> {
        self.state
            .read()
            .await
            .analyses
            .get(key)
            .and_then(|cell| cell.get().cloned())
    }

    /// Cached result for the active file, if it has been analyzed.
    pub async fn active_analysis(&self) -> Option<(UploadedFile, Arc<AnalysisResult>)> {
        let state = self.state.read().await;
        let key = state.active_file.as_ref()?;
        let file = state.uploads.get(key)?.clone();
        let result = state.analyses.get(key)?.get()?.clone();
        Some((file, result))
    }

    /// Return the cached analysis for `key`, or run `init` to produce it.
    ///
    /// Concurrent callers for the same key wait on a single `init`. A failed
    /// `init` caches nothing, so the next call retries.
    pub async fn compute_or_fetch<F, Fut>(&self, key: &str, init: F) -> Result<Arc<AnalysisResult>, PipelineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AnalysisResult, PipelineError>>,
    {
        let cell = {
            let mut state = self.state.write().await;
            state
                .analyses
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_try_init(|| async { init().await.map(Arc::new) })
            .await?;
        Ok(result.clone())
    }

    pub async fn chat_messages(&self) -> Vec<ChatMessage> {
        self.state.read().await.chat_messages.clone()
    }

    pub fn chat_state(&self) -> ChatState {
        if self.awaiting_response.load(Ordering::Acquire) {
            ChatState::AwaitingResponse
        } else {
            ChatState::Idle
        }
    }

    /// Kept outside the state lock so it can be reset from `Drop`.
    pub(crate) fn set_chat_state(&self, chat_state: ChatState) {
        self.awaiting_response
            .store(chat_state == ChatState::AwaitingResponse, Ordering::Release);
    }

    /// Append a completed question/answer pair in one step.
    pub(crate) async fn push_chat_turn(&self, question: ChatMessage, answer: ChatMessage) {
        let mut state = self.state.write().await;
        state.chat_messages.push(question);
        state.chat_messages.push(answer);
        state.last_active_at = Utc::now();
    }

    pub(crate) async fn lock_chat(&self) -> MutexGuard<'_, ()> {
        self.chat_gate.lock().await
    }

    pub fn progress(&self) -> &ProgressChannel {
        &self.progress
    }

    pub fn progress_sink(&self, run_id: &str) -> ProgressSink {
        self.progress.sink(run_id)
    }

    /// Token for work that must stop when the session ends.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn create(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(Uuid::new_v4().to_string()));
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        tracing::info!("🆕 Created session: {}", session.id);
        session
    }

    /// Look up a session and mark it active.
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.read().await.get(id).cloned()?;
        session.touch().await;
        Some(session)
    }

    /// Remove a session and cancel its in-flight work.
    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.write().await.remove(id)?;
        session.close();
        tracing::info!("🗑️ Closed session: {}", id);
        Some(session)
    }

    /// Remove every session idle since before `now - ttl`.
    pub async fn expire_idle(&self, now: DateTime<Utc>) -> Vec<Arc<Session>> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        let cutoff = now - ttl;

        let candidates: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let mut expired_ids = Vec::new();
        for session in candidates {
            if session.last_active_at().await < cutoff {
                expired_ids.push(session.id.clone());
            }
        }

        let mut removed = Vec::new();
        for id in expired_ids {
            if let Some(session) = self.remove(&id).await {
                removed.push(session);
            }
        }
        if !removed.is_empty() {
            tracing::info!("Expired {} idle session(s)", removed.len());
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
