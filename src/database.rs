//! SQLite persistence for debates, their turns and the persona cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use sqlite::{Connection, State, Statement};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::DebateError;
use crate::features::debate::DebateId;
use crate::features::personas::{Persona, PersonaCache, PersonaCacheKey};
use crate::features::transcripts::{DebateRecord, NewDebate, TurnRecord, TurnStore};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS debates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        topic TEXT NOT NULL,
        name1 TEXT NOT NULL,
        name2 TEXT NOT NULL,
        provider TEXT NOT NULL,
        questions TEXT NOT NULL,
        answer_length INTEGER NOT NULL,
        persona1 TEXT NOT NULL,
        persona2 TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS debate_turns (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        debate_id INTEGER NOT NULL REFERENCES debates(id),
        turn_number INTEGER NOT NULL,
        speaker TEXT NOT NULL,
        content TEXT NOT NULL,
        prompt TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (debate_id, turn_number)
    );

    CREATE INDEX IF NOT EXISTS idx_debate_turns_debate ON debate_turns(debate_id);

    CREATE TABLE IF NOT EXISTS persona_cache (
        topic TEXT NOT NULL,
        name1 TEXT NOT NULL,
        name2 TEXT NOT NULL,
        answer_length INTEGER NOT NULL,
        provider TEXT NOT NULL,
        persona1 TEXT NOT NULL,
        persona2 TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (topic, name1, name2, answer_length, provider)
    );
";

const DEBATE_COLUMNS: &str =
    "id, topic, name1, name2, provider, questions, answer_length, persona1, persona2, created_at";

#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path`. `":memory:"` gives a private in-memory database.
    pub async fn new(path: &str) -> Result<Self, DebateError> {
        let connection = sqlite::open(path)?;
        connection.execute(SCHEMA)?;
        info!("Database ready at {path}");
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }
}

fn read_timestamp(statement: &Statement, column: &str) -> Result<DateTime<Utc>, DebateError> {
    let raw = statement.read::<String, _>(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DebateError::Storage(format!("bad timestamp '{raw}' in {column}: {e}")))
}

fn read_debate(statement: &Statement) -> Result<DebateRecord, DebateError> {
    Ok(DebateRecord {
        id: statement.read::<i64, _>("id")?,
        topic: statement.read::<String, _>("topic")?,
        name1: statement.read::<String, _>("name1")?,
        name2: statement.read::<String, _>("name2")?,
        provider: statement.read::<String, _>("provider")?,
        questions: serde_json::from_str(&statement.read::<String, _>("questions")?)?,
        answer_length: statement.read::<i64, _>("answer_length")? as u32,
        persona1: serde_json::from_str(&statement.read::<String, _>("persona1")?)?,
        persona2: serde_json::from_str(&statement.read::<String, _>("persona2")?)?,
        created_at: read_timestamp(statement, "created_at")?,
    })
}

fn debate_exists(connection: &Connection, debate_id: DebateId) -> Result<bool, DebateError> {
    let mut statement = connection.prepare("SELECT 1 FROM debates WHERE id = ?")?;
    statement.bind((1, debate_id))?;
    Ok(statement.next()? == State::Row)
}

#[async_trait]
impl TurnStore for Database {
    async fn create_debate(&self, debate: &NewDebate) -> Result<DebateId, DebateError> {
        let questions = serde_json::to_string(&debate.questions)?;
        let persona1 = serde_json::to_string(&debate.persona1)?;
        let persona2 = serde_json::to_string(&debate.persona2)?;
        let now = Utc::now().to_rfc3339();

        let connection = self.connection.lock().await;
        let mut statement = connection.prepare(
            "INSERT INTO debates (topic, name1, name2, provider, questions, answer_length, persona1, persona2, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        statement.bind((1, debate.topic.as_str()))?;
        statement.bind((2, debate.name1.as_str()))?;
        statement.bind((3, debate.name2.as_str()))?;
        statement.bind((4, debate.provider.as_str()))?;
        statement.bind((5, questions.as_str()))?;
        statement.bind((6, debate.answer_length as i64))?;
        statement.bind((7, persona1.as_str()))?;
        statement.bind((8, persona2.as_str()))?;
        statement.bind((9, now.as_str()))?;
        statement.next()?;

        let mut statement = connection.prepare("SELECT last_insert_rowid()")?;
        statement.next()?;
        let id = statement.read::<i64, _>(0)?;

        debug!("Recorded debate {id} on '{}'", debate.topic);
        Ok(id)
    }

    async fn append_turn(
        &self,
        debate_id: DebateId,
        speaker: &str,
        content: &str,
        prompt: &str,
        turn_number: u64,
    ) -> Result<(), DebateError> {
        let now = Utc::now().to_rfc3339();
        let connection = self.connection.lock().await;
        if !debate_exists(&connection, debate_id)? {
            return Err(DebateError::DebateNotFound(debate_id));
        }

        let mut statement = connection.prepare(
            "INSERT INTO debate_turns (debate_id, turn_number, speaker, content, prompt, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )?;
        statement.bind((1, debate_id))?;
        statement.bind((2, turn_number as i64))?;
        statement.bind((3, speaker))?;
        statement.bind((4, content))?;
        statement.bind((5, prompt))?;
        statement.bind((6, now.as_str()))?;
        statement.next()?;
        Ok(())
    }

    async fn list_turns(&self, debate_id: DebateId) -> Result<Vec<TurnRecord>, DebateError> {
        let connection = self.connection.lock().await;
        let mut statement = connection.prepare(
            "SELECT debate_id, turn_number, speaker, content, prompt, created_at
             FROM debate_turns WHERE debate_id = ? ORDER BY turn_number",
        )?;
        statement.bind((1, debate_id))?;

        let mut turns = Vec::new();
        while statement.next()? == State::Row {
            turns.push(TurnRecord {
                debate_id: statement.read::<i64, _>("debate_id")?,
                turn_number: statement.read::<i64, _>("turn_number")? as u64,
                speaker: statement.read::<String, _>("speaker")?,
                content: statement.read::<String, _>("content")?,
                prompt: statement.read::<String, _>("prompt")?,
                created_at: read_timestamp(&statement, "created_at")?,
            });
        }
        Ok(turns)
    }

    async fn get_debate(&self, debate_id: DebateId) -> Result<Option<DebateRecord>, DebateError> {
        let connection = self.connection.lock().await;
        let mut statement =
            connection.prepare(format!("SELECT {DEBATE_COLUMNS} FROM debates WHERE id = ?"))?;
        statement.bind((1, debate_id))?;

        if statement.next()? == State::Row {
            Ok(Some(read_debate(&statement)?))
        } else {
            Ok(None)
        }
    }

    async fn list_debates(&self, limit: usize) -> Result<Vec<DebateRecord>, DebateError> {
        let connection = self.connection.lock().await;
        let mut statement = connection.prepare(format!(
            "SELECT {DEBATE_COLUMNS} FROM debates ORDER BY id DESC LIMIT ?"
        ))?;
        statement.bind((1, limit as i64))?;

        let mut debates = Vec::new();
        while statement.next()? == State::Row {
            debates.push(read_debate(&statement)?);
        }
        Ok(debates)
    }
}

#[async_trait]
impl PersonaCache for Database {
    async fn lookup(&self, key: &PersonaCacheKey) -> Result<Option<(Persona, Persona)>, DebateError> {
        let connection = self.connection.lock().await;
        let mut statement = connection.prepare(
            "SELECT persona1, persona2 FROM persona_cache
             WHERE topic = ? AND name1 = ? AND name2 = ? AND answer_length = ? AND provider = ?",
        )?;
        statement.bind((1, key.topic.as_str()))?;
        statement.bind((2, key.name1.as_str()))?;
        statement.bind((3, key.name2.as_str()))?;
        statement.bind((4, key.answer_length as i64))?;
        statement.bind((5, key.provider.as_str()))?;

        if statement.next()? != State::Row {
            return Ok(None);
        }
        let persona1: Persona = serde_json::from_str(&statement.read::<String, _>("persona1")?)?;
        let persona2: Persona = serde_json::from_str(&statement.read::<String, _>("persona2")?)?;
        Ok(Some((persona1, persona2)))
    }

    async fn store(&self, key: &PersonaCacheKey, personas: &(Persona, Persona)) -> Result<(), DebateError> {
        let persona1 = serde_json::to_string(&personas.0)?;
        let persona2 = serde_json::to_string(&personas.1)?;
        let now = Utc::now().to_rfc3339();

        let connection = self.connection.lock().await;
        let mut statement = connection.prepare(
            "INSERT OR REPLACE INTO persona_cache
             (topic, name1, name2, answer_length, provider, persona1, persona2, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        statement.bind((1, key.topic.as_str()))?;
        statement.bind((2, key.name1.as_str()))?;
        statement.bind((3, key.name2.as_str()))?;
        statement.bind((4, key.answer_length as i64))?;
        statement.bind((5, key.provider.as_str()))?;
        statement.bind((6, persona1.as_str()))?;
        statement.bind((7, persona2.as_str()))?;
        statement.bind((8, now.as_str()))?;
        statement.next()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_debate(topic: &str) -> NewDebate {
        NewDebate {
            topic: topic.to_string(),
            name1: "Ava".to_string(),
            name2: "Ben".to_string(),
            provider: "openai".to_string(),
            questions: vec!["Does pineapple belong on pizza?".to_string()],
            answer_length: 100,
            persona1: Persona::new("Ava", "You are Ava."),
            persona2: Persona::new("Ben", "You are Ben."),
        }
    }

    #[tokio::test]
    async fn test_debate_roundtrip() {
        let db = Database::new(":memory:").await.unwrap();
        let id = db.create_debate(&sample_debate("Pizza")).await.unwrap();

        let record = db.get_debate(id).await.unwrap().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.topic, "Pizza");
        assert_eq!(record.questions, vec!["Does pineapple belong on pizza?"]);
        assert_eq!(record.persona2, Persona::new("Ben", "You are Ben."));
        assert!(db.get_debate(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_turns_ordered_and_scoped() {
        let db = Database::new(":memory:").await.unwrap();
        let first = db.create_debate(&sample_debate("Pizza")).await.unwrap();
        let second = db.create_debate(&sample_debate("Cats")).await.unwrap();

        db.append_turn(first, "Ava", "Opening.", "prompt 0", 0).await.unwrap();
        db.append_turn(second, "Ava", "Elsewhere.", "prompt 0", 0).await.unwrap();
        db.append_turn(first, "Ben", "Rebuttal.", "prompt 1", 1).await.unwrap();

        let turns = db.list_turns(first).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].speaker, "Ava");
        assert_eq!(turns[1].content, "Rebuttal.");
        assert_eq!(turns[1].turn_number, 1);
    }

    #[tokio::test]
    async fn test_duplicate_turn_number_rejected() {
        let db = Database::new(":memory:").await.unwrap();
        let id = db.create_debate(&sample_debate("Pizza")).await.unwrap();
        db.append_turn(id, "Ava", "Opening.", "p", 0).await.unwrap();

        let err = db.append_turn(id, "Ava", "Again.", "p", 0).await.unwrap_err();
        assert!(matches!(err, DebateError::Storage(_)));
    }

    #[tokio::test]
    async fn test_turn_for_missing_debate() {
        let db = Database::new(":memory:").await.unwrap();
        let err = db.append_turn(5, "Ava", "x", "p", 0).await.unwrap_err();
        assert!(matches!(err, DebateError::DebateNotFound(5)));
    }

    #[tokio::test]
    async fn test_list_debates_limit() {
        let db = Database::new(":memory:").await.unwrap();
        for topic in ["one", "two", "three"] {
            db.create_debate(&sample_debate(topic)).await.unwrap();
        }
        let debates = db.list_debates(2).await.unwrap();
        assert_eq!(debates.len(), 2);
        assert_eq!(debates[0].topic, "three");
    }

    #[tokio::test]
    async fn test_persona_cache() {
        let db = Database::new(":memory:").await.unwrap();
        let key = PersonaCacheKey::new("Pizza", "Ben", "Ava", 100, "openai");
        assert!(db.lookup(&key).await.unwrap().is_none());

        let pair = (Persona::new("Ava", "You are Ava."), Persona::new("Ben", "You are Ben."));
        db.store(&key, &pair).await.unwrap();
        db.store(&key, &pair).await.unwrap();

        let swapped = PersonaCacheKey::new("Pizza", "Ava", "Ben", 100, "openai");
        assert_eq!(db.lookup(&swapped).await.unwrap(), Some(pair));
        let other_provider = PersonaCacheKey::new("Pizza", "Ava", "Ben", 100, "scripted");
        assert!(db.lookup(&other_provider).await.unwrap().is_none());
    }
}
