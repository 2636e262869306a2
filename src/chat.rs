// src/chat.rs
//! Follow-up questions about an analyzed recording.

use crate::llm::{AnalysisAssistant, LlmError};
use crate::models::{ChatMessage, ChatState};
use crate::session::Session;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Question must not be empty")]
    EmptyQuestion,
    #[error("Upload and analyze a recording before asking questions")]
    NoAnalysis,
    #[error(transparent)]
    Assistant(#[from] LlmError),
}

/// One completed question/answer round.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub question: ChatMessage,
    pub answer: ChatMessage,
    pub history_len: usize,
}

#[derive(Clone)]
pub struct ChatController {
    assistant: Option<Arc<dyn AnalysisAssistant>>,
}

impl ChatController {
    pub fn new(assistant: Option<Arc<dyn AnalysisAssistant>>) -> Self {
        Self { assistant }
    }

    pub fn is_configured(&self) -> bool {
        self.assistant.is_some()
    }

    /// Ask a question about the session's active analysis.
    ///
    /// Questions within one session are answered strictly one at a time, in
    /// arrival order. History only changes when the assistant answers, so a
    /// failed round can simply be retried. The question is forwarded and
    /// recorded exactly as typed.
    pub async fn ask(&self, session: &Session, question: &str) -> Result<ChatTurn, ChatError> {
        if question.trim().is_empty() {
            return Err(ChatError::EmptyQuestion);
        }
        let assistant = self.assistant.as_ref().ok_or(LlmError::NotConfigured)?;

        let _gate = session.lock_chat().await;

        let (_, analysis) = session.active_analysis().await.ok_or(ChatError::NoAnalysis)?;

        let answer = {
            // Resets to Idle even if this future is dropped mid-request.
            let _awaiting = AwaitingResponse::enter(session);
            tracing::info!(session_id = %session.id(), "💬 Question: {}", question);
            assistant.ask(question, &analysis).await
        };

        let answer = answer.map_err(|e| {
            tracing::error!(session_id = %session.id(), "Assistant failed: {}", e);
            e
        })?;

        let turn_question = ChatMessage::user(question);
        let turn_answer = ChatMessage::assistant(answer);
        session
            .push_chat_turn(turn_question.clone(), turn_answer.clone())
            .await;

        Ok(ChatTurn {
            question: turn_question,
            answer: turn_answer,
            history_len: session.chat_messages().await.len(),
        })
    }
}

struct AwaitingResponse<'a> {
    session: &'a Session,
}

impl<'a> AwaitingResponse<'a> {
    fn enter(session: &'a Session) -> Self {
        session.set_chat_state(ChatState::AwaitingResponse);
        Self { session }
    }
}

impl Drop for AwaitingResponse<'_> {
    fn drop(&mut self) {
        self.session.set_chat_state(ChatState::Idle);
    }
}
