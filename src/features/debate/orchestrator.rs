//! # Debate Orchestrator
//!
//! Owns every live debate session and advances them one turn at a time.
//!
//! A turn is all-or-nothing: the reply is generated and relayed, persisted,
//! appended to history, and only then does the floor pass to the other
//! persona. Any failure before the store write leaves the session exactly as
//! it was, so the same turn can be requested again.

use dashmap::DashMap;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::state::{DebateRequest, DebateState};
use super::DebateId;
use crate::core::DebateError;
use crate::features::generation::{GenerationRequest, Generator};
use crate::features::history::{CharEstimate, HistoryStore, TokenCounter, DEFAULT_TOKEN_CEILING};
use crate::features::personas::{Persona, PersonaGenerator};
use crate::features::prompts::TurnPromptBuilder;
use crate::features::relay::StreamingRelay;
use crate::features::transcripts::{DebateRecord, DebateTranscript, NewDebate, TurnStore};

/// One live debate
pub struct DebateSession {
    pub id: DebateId,
    pub state: DebateState,
    pub history: HistoryStore,
}

/// A committed turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub debate_id: DebateId,
    pub turn_index: u64,
    pub speaker: String,
    pub content: String,
    pub prompt: String,
}

/// Point-in-time view of a live debate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateSnapshot {
    pub id: DebateId,
    pub topic: String,
    pub persona_a: Persona,
    pub persona_b: Persona,
    pub current_speaker: String,
    pub turn_count: u64,
    pub history_tokens: usize,
    pub compactions: usize,
}

impl DebateSnapshot {
    fn of(session: &DebateSession) -> Self {
        Self {
            id: session.id,
            topic: session.state.topic.clone(),
            persona_a: session.state.persona_a.clone(),
            persona_b: session.state.persona_b.clone(),
            current_speaker: session.state.current_speaker().name.clone(),
            turn_count: session.state.turn_count,
            history_tokens: session.history.token_count(),
            compactions: session.history.compaction_count(),
        }
    }
}

pub struct DebateOrchestrator {
    generator: Arc<dyn Generator>,
    summarizer: Arc<dyn Generator>,
    personas: PersonaGenerator,
    store: Arc<dyn TurnStore>,
    sessions: DashMap<DebateId, Arc<Mutex<DebateSession>>>,
    token_ceiling: usize,
    token_counter: Arc<dyn TokenCounter>,
}

impl DebateOrchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        summarizer: Arc<dyn Generator>,
        personas: PersonaGenerator,
        store: Arc<dyn TurnStore>,
    ) -> Self {
        Self {
            generator,
            summarizer,
            personas,
            store,
            sessions: DashMap::new(),
            token_ceiling: DEFAULT_TOKEN_CEILING,
            token_counter: Arc::new(CharEstimate),
        }
    }

    /// History budget for sessions started after this call
    pub fn with_token_ceiling(mut self, ceiling: usize) -> Self {
        self.token_ceiling = ceiling;
        self
    }

    /// Measure history budgets with `counter`; shared by every session
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.token_counter = counter;
        self
    }

    /// Create a debate: generate (or recall) both personas, record the debate,
    /// and open a session with the first persona holding the floor.
    pub async fn start(&self, request: DebateRequest) -> Result<DebateSnapshot, DebateError> {
        request.validate()?;

        let (persona_a, persona_b) = self
            .personas
            .generate(&request.topic, &request.name1, &request.name2, request.answer_length)
            .await?;

        let record = NewDebate {
            topic: request.topic.clone(),
            name1: request.name1.clone(),
            name2: request.name2.clone(),
            provider: self.personas.provider().to_string(),
            questions: request.questions.clone(),
            answer_length: request.answer_length,
            persona1: persona_a.clone(),
            persona2: persona_b.clone(),
        };
        let id = self.store.create_debate(&record).await?;

        let session = DebateSession {
            id,
            state: DebateState::new(
                request.topic,
                persona_a,
                persona_b,
                request.questions,
                request.answer_length,
            ),
            history: HistoryStore::new(self.summarizer.clone())
                .with_token_ceiling(self.token_ceiling)
                .with_counter(self.token_counter.clone()),
        };
        let snapshot = DebateSnapshot::of(&session);
        self.sessions.insert(id, Arc::new(Mutex::new(session)));

        info!(
            "Started debate {} on '{}': {} vs {}",
            id, snapshot.topic, snapshot.persona_a.name, snapshot.persona_b.name
        );
        Ok(snapshot)
    }

    /// Produce the next turn, relaying fragments as they are generated.
    ///
    /// Fails with [`DebateError::TurnInProgress`] if this debate is already
    /// mid-turn, and with [`DebateError::Cancelled`] if the observer goes away
    /// before the reply is complete. Every failure is also reported to the
    /// relay as an error event.
    pub async fn advance_turn(&self, id: DebateId, relay: &StreamingRelay) -> Result<TurnOutcome, DebateError> {
        match self.advance_locked(id, relay).await {
            Ok(outcome) => {
                if let Err(e) = relay.end_of_turn(&outcome.speaker, outcome.turn_index).await {
                    debug!("Debate {id}: observer left after turn {} was committed: {e}", outcome.turn_index);
                }
                Ok(outcome)
            }
            Err(e) => {
                match &e {
                    DebateError::Cancelled => info!("Debate {id}: turn cancelled by observer"),
                    other => warn!("Debate {id}: turn failed, state unchanged: {other}"),
                }
                let _ = relay.error(&e).await;
                Err(e)
            }
        }
    }

    async fn advance_locked(&self, id: DebateId, relay: &StreamingRelay) -> Result<TurnOutcome, DebateError> {
        let session = self.session(id)?;
        let mut guard = session.try_lock().map_err(|_| DebateError::TurnInProgress(id))?;
        self.run_turn(&mut guard, relay).await
    }

    /// Produce the next turn without streaming; the outcome carries the full reply
    pub async fn advance_turn_collected(&self, id: DebateId) -> Result<TurnOutcome, DebateError> {
        self.advance_turn(id, &StreamingRelay::silent()).await
    }

    /// Close a live debate. Its record and turns stay in the store.
    pub fn end_debate(&self, id: DebateId) -> Result<(), DebateError> {
        if self.sessions.remove(&id).is_none() {
            return Err(DebateError::DebateNotFound(id));
        }
        info!("Ended debate {id}");
        Ok(())
    }

    /// Current state of a live debate; waits for a turn in progress to settle
    pub async fn snapshot(&self, id: DebateId) -> Result<DebateSnapshot, DebateError> {
        let session = self.session(id)?;
        let guard = session.lock().await;
        Ok(DebateSnapshot::of(&guard))
    }

    /// Stored record and turns of any debate, live or ended
    pub async fn get_debate(&self, id: DebateId) -> Result<DebateTranscript, DebateError> {
        let debate = self
            .store
            .get_debate(id)
            .await?
            .ok_or(DebateError::DebateNotFound(id))?;
        let turns = self.store.list_turns(id).await?;
        Ok(DebateTranscript { debate, turns })
    }

    pub async fn list_debates(&self, limit: usize) -> Result<Vec<DebateRecord>, DebateError> {
        self.store.list_debates(limit).await
    }

    /// Ids of debates with a live session
    pub fn active_debates(&self) -> Vec<DebateId> {
        let mut ids: Vec<DebateId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    fn session(&self, id: DebateId) -> Result<Arc<Mutex<DebateSession>>, DebateError> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(DebateError::DebateNotFound(id))
    }

    async fn run_turn(&self, session: &mut DebateSession, relay: &StreamingRelay) -> Result<TurnOutcome, DebateError> {
        let DebateSession { id, state, history } = session;
        let id = *id;

        let speaker = state.current_speaker().clone();
        let opponent = state.opponent().clone();
        let turn_index = state.turn_count;

        let own_last = history
            .last_message_by_sender(&speaker.name)
            .map(|t| t.content.clone())
            .unwrap_or_default();
        let opponent_last = history
            .last_message_by_sender(&opponent.name)
            .map(|t| t.content.clone())
            .unwrap_or_default();
        let transcript = history.render_history();

        let prompt = TurnPromptBuilder::new(&speaker.name, &opponent.name, &state.topic)
            .with_history(&transcript)
            .with_last_messages(&own_last, &opponent_last)
            .with_turn(turn_index, state.seed_question())
            .with_max_words(state.answer_length)
            .build();

        let request = GenerationRequest::new(speaker.system_prompt.clone(), prompt.clone())
            .with_max_tokens(state.max_tokens());

        debug!("Debate {id}: generating turn {turn_index} for {}", speaker.name);
        let content = self.relay_reply(&speaker.name, &request, relay).await?;

        if let Err(e) = self
            .store
            .append_turn(id, &speaker.name, &content, &prompt, turn_index)
            .await
        {
            error!("Debate {id}: failed to persist turn {turn_index}: {e}");
            return Err(e);
        }

        history.append(content.clone(), speaker.name.clone()).await;
        state.advance();

        info!("Debate {id}: {} finished turn {turn_index}", speaker.name);
        Ok(TurnOutcome {
            debate_id: id,
            turn_index,
            speaker: speaker.name,
            content,
            prompt,
        })
    }

    /// Generate a reply, forwarding each fragment, and return the whole text
    async fn relay_reply(
        &self,
        speaker: &str,
        request: &GenerationRequest,
        relay: &StreamingRelay,
    ) -> Result<String, DebateError> {
        let mut stream = tokio::select! {
            biased;
            _ = relay.closed() => return Err(DebateError::Cancelled),
            stream = self.generator.generate(request) => stream?,
        };

        let mut content = String::new();
        loop {
            let item = tokio::select! {
                biased;
                _ = relay.closed() => return Err(DebateError::Cancelled),
                item = stream.next() => item,
            };
            match item {
                Some(Ok(fragment)) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    relay.fragment(speaker, &fragment).await?;
                    content.push_str(&fragment);
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        if content.trim().is_empty() {
            return Err(DebateError::Generation(format!("{speaker} produced an empty reply")));
        }
        Ok(content)
    }
}
