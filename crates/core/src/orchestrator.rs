use crate::embeddings::Embedder;
use crate::retriever::Retriever;
use crate::traits::{LanguageModel, VectorIndex};
use crate::{ChatError, ChatMessage, ChatTurn, RetrievedChunk};
use tracing::{debug, info};
use uuid::Uuid;

pub const SYSTEM_INSTRUCTIONS: &str = "Use the following pieces of context to answer the user's question. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

pub const CONDENSE_INSTRUCTIONS: &str = "Given the conversation below and a follow-up question, \
rewrite the follow-up as a standalone question in its original language. \
Reply with the question only.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingQuery,
    Generating,
}

/// One conversation. Retrieval and the model are shared; history is not.
pub struct ChatSession<'a, E, V, L> {
    id: Uuid,
    retriever: &'a Retriever<E, V>,
    llm: &'a L,
    history: Vec<ChatTurn>,
    state: SessionState,
}

impl<'a, E, V, L> ChatSession<'a, E, V, L>
where
    E: Embedder,
    V: VectorIndex,
    L: LanguageModel,
{
    pub fn new(retriever: &'a Retriever<E, V>, llm: &'a L) -> Self {
        Self {
            id: Uuid::new_v4(),
            retriever,
            llm,
            history: Vec::new(),
            state: SessionState::AwaitingQuery,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Runs one turn. On any failure the history is left as it was.
    pub fn ask(&mut self, query: &str) -> Result<String, ChatError> {
        if query.trim().is_empty() {
            return Err(ChatError::EmptyQuery);
        }

        self.state = SessionState::Generating;
        let outcome = self.generate(query);
        self.state = SessionState::AwaitingQuery;

        let answer = outcome?;
        self.history.push(ChatTurn {
            query: query.to_string(),
            answer: answer.clone(),
        });
        info!(session = %self.id, turns = self.history.len(), "turn completed");
        Ok(answer)
    }

    fn generate(&self, query: &str) -> Result<String, ChatError> {
        let search_query = self.standalone_question(query)?;
        let context = self.retriever.retrieve(&search_query)?;
        let messages = build_messages(&context, &self.history, query);
        debug!(
            session = %self.id,
            context_chunks = context.len(),
            messages = messages.len(),
            model = self.llm.model_id(),
            "calling language model"
        );
        Ok(self.llm.complete(&messages)?)
    }

    /// Follow-ups are rewritten against the history so retrieval sees the
    /// full question. The first turn is searched as typed.
    fn standalone_question(&self, query: &str) -> Result<String, ChatError> {
        if self.history.is_empty() {
            return Ok(query.to_string());
        }

        let messages = [ChatMessage::user(condense_prompt(&self.history, query))];
        let rewritten = self.llm.complete(&messages)?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            return Ok(query.to_string());
        }

        debug!(session = %self.id, standalone = rewritten, "condensed follow-up");
        Ok(rewritten.to_string())
    }
}

fn condense_prompt(history: &[ChatTurn], query: &str) -> String {
    let transcript = history
        .iter()
        .map(|turn| format!("User: {}\nAssistant: {}", turn.query, turn.answer))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{CONDENSE_INSTRUCTIONS}\n\nConversation:\n{transcript}\n\nFollow-up: {query}\nStandalone question:")
}

/// System instructions with retrieved context, then every earlier turn, then
/// the new query.
pub fn build_messages(context: &[RetrievedChunk], history: &[ChatTurn], query: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(ChatMessage::system(format!(
        "{SYSTEM_INSTRUCTIONS}\n\n{}",
        format_context(context)
    )));

    for turn in history {
        messages.push(ChatMessage::user(turn.query.clone()));
        messages.push(ChatMessage::assistant(turn.answer.clone()));
    }

    messages.push(ChatMessage::user(query));
    messages
}

fn format_context(context: &[RetrievedChunk]) -> String {
    if context.is_empty() {
        return "(no matching documents)".to_string();
    }

    context
        .iter()
        .enumerate()
        .map(|(index, chunk)| {
            format!(
                "[{}] {} ({})\n{}",
                index + 1,
                chunk.source_path,
                chunk.location,
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
