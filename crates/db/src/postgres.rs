use crate::{error, QuizStore};
use model::{Quiz, QuizItem};
use tokio_postgres::{error::SqlState, types::Json, Client};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS quiz (\
        name TEXT PRIMARY KEY CONSTRAINT name_check CHECK (name <> ''), \
        items JSONB NOT NULL CONSTRAINT items_check CHECK (jsonb_array_length(items) > 0)\
    )";

/// One row per quiz, with the questions kept as a JSON array.
pub struct Database(Client);

impl From<Client> for Database {
    fn from(client: Client) -> Self {
        Self(client)
    }
}

fn map_write_error(err: tokio_postgres::Error) -> error::Error {
    let Some(db_err) = err.as_db_error() else {
        log::error!("quiz write failed: {err}");
        return error::Error::Fatal;
    };

    if *db_err.code() != SqlState::CHECK_VIOLATION {
        log::error!("quiz write failed: {db_err}");
        return error::Error::Fatal;
    }

    match db_err.constraint() {
        Some("name_check") => model::Invalid::EmptyName.into(),
        Some("items_check") => model::Invalid::NoItems.into(),
        _ => error::Error::Fatal,
    }
}

impl Database {
    /// Creates the quiz table if it does not exist yet.
    pub async fn init_schema(&self) -> error::Result<()> {
        self.0.batch_execute(SCHEMA).await.map_err(|err| {
            log::error!("cannot initialize schema: {err}");
            error::Error::Fatal
        })
    }
}

impl QuizStore for Database {
    async fn put(&self, name: &str, items: Vec<QuizItem>) -> error::Result<Quiz> {
        let quiz = Quiz::new(name, items)?;
        self.0
            .execute(
                "INSERT INTO quiz (name, items) VALUES ($1, $2) ON CONFLICT (name) DO UPDATE SET items = excluded.items",
                &[&quiz.name(), &Json(quiz.items())],
            )
            .await
            .map_err(map_write_error)?;
        Ok(quiz)
    }

    async fn get(&self, name: &str) -> error::Result<Quiz> {
        let row = self
            .0
            .query_opt("SELECT items FROM quiz WHERE name = $1", &[&name])
            .await
            .map_err(|_| error::Error::Fatal)?
            .ok_or(error::Error::NotFound)?;
        let Json(items) = row.try_get::<_, Json<Vec<QuizItem>>>("items").map_err(|err| {
            log::error!("quiz `{name}` has a malformed record: {err}");
            error::Error::Fatal
        })?;

        // Rows written by other tools may still violate the item invariants.
        Quiz::new(name, items).map_err(|err| {
            log::error!("quiz `{name}` is corrupted: {err}");
            error::Error::Fatal
        })
    }

    async fn list(&self) -> error::Result<Vec<Box<str>>> {
        let rows = self.0.query("SELECT name FROM quiz ORDER BY name", &[]).await.map_err(|_| error::Error::Fatal)?;
        rows.into_iter()
            .map(|row| row.try_get::<_, String>("name").map(String::into_boxed_str))
            .collect::<Result<_, _>>()
            .map_err(|_| error::Error::Fatal)
    }

    async fn delete(&self, name: &str) -> error::Result<bool> {
        let count =
            self.0.execute("DELETE FROM quiz WHERE name = $1", &[&name]).await.map_err(|_| error::Error::Fatal)?;
        Ok(count > 0)
    }
}
