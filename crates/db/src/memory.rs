use crate::{error, QuizStore};
use model::{Quiz, QuizItem};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    quizzes: RwLock<BTreeMap<Box<str>, Quiz>>,
}

impl QuizStore for MemoryStore {
    async fn put(&self, name: &str, items: Vec<QuizItem>) -> error::Result<Quiz> {
        let quiz = Quiz::new(name, items)?;
        self.quizzes.write().await.insert(name.into(), quiz.clone());
        Ok(quiz)
    }

    async fn get(&self, name: &str) -> error::Result<Quiz> {
        self.quizzes.read().await.get(name).cloned().ok_or(error::Error::NotFound)
    }

    async fn list(&self) -> error::Result<Vec<Box<str>>> {
        Ok(self.quizzes.read().await.keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> error::Result<bool> {
        Ok(self.quizzes.write().await.remove(name).is_some())
    }
}
