pub mod error;

mod memory;
mod postgres;

use core::future::Future;
use model::{Quiz, QuizItem};

pub use memory::MemoryStore;
pub use postgres::Database;
pub use tokio_postgres::{tls::NoTls, Client, Config};

/// Durable mapping from quiz name to its ordered questions. Every operation reads or writes a
/// whole quiz record at once, so readers never observe a partially written quiz.
pub trait QuizStore: Send + Sync {
    /// Validates and stores the quiz under `name`, replacing any previous quiz of that name.
    fn put(&self, name: &str, items: Vec<QuizItem>) -> impl Future<Output = error::Result<Quiz>> + Send;

    fn get(&self, name: &str) -> impl Future<Output = error::Result<Quiz>> + Send;

    /// Names of all known quizzes in ascending order.
    fn list(&self) -> impl Future<Output = error::Result<Vec<Box<str>>>> + Send;

    /// Returns `true` if a quiz was actually removed.
    fn delete(&self, name: &str) -> impl Future<Output = error::Result<bool>> + Send;
}

/// Storage backend selected at startup.
pub enum Store {
    Memory(MemoryStore),
    Postgres(Database),
}

impl From<MemoryStore> for Store {
    fn from(store: MemoryStore) -> Self {
        Self::Memory(store)
    }
}

impl From<Database> for Store {
    fn from(db: Database) -> Self {
        Self::Postgres(db)
    }
}

impl QuizStore for Store {
    async fn put(&self, name: &str, items: Vec<QuizItem>) -> error::Result<Quiz> {
        match self {
            Self::Memory(store) => store.put(name, items).await,
            Self::Postgres(db) => db.put(name, items).await,
        }
    }

    async fn get(&self, name: &str) -> error::Result<Quiz> {
        match self {
            Self::Memory(store) => store.get(name).await,
            Self::Postgres(db) => db.get(name).await,
        }
    }

    async fn list(&self) -> error::Result<Vec<Box<str>>> {
        match self {
            Self::Memory(store) => store.list().await,
            Self::Postgres(db) => db.list().await,
        }
    }

    async fn delete(&self, name: &str) -> error::Result<bool> {
        match self {
            Self::Memory(store) => store.delete(name).await,
            Self::Postgres(db) => db.delete(name).await,
        }
    }
}
