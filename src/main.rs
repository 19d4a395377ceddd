mod config;

use anyhow::Context;
use api::{Bot, Verifier};
use core::{convert::Infallible, pin::pin};
use db::{Database, MemoryStore, NoTls, Store};
use engine::ChatCompletions;
use hyper::{server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use log::{error, info, warn};
use std::{net::Ipv4Addr, sync::Arc};
use tokio::{net::TcpListener, runtime::Runtime, signal};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = config::Config::from_env()?;
    let runtime = Runtime::new()?;
    runtime.block_on(run(config))
}

async fn connect(pg: config::Postgres) -> anyhow::Result<Store> {
    let config::Postgres { host, user, password, dbname } = pg;
    let (client, conn) = db::Config::new()
        .host(&host)
        .user(&user)
        .password(&password)
        .dbname(&dbname)
        .connect(NoTls)
        .await
        .context("cannot connect to the database")?;

    tokio::spawn(async move {
        if let Err(err) = conn.await {
            error!("database connection closed: {err}");
        }
    });

    let db = Database::from(client);
    db.init_schema().await.map_err(|err| anyhow::anyhow!("cannot initialize the schema: {err}"))?;
    info!("connected to the database at {host}");
    Ok(Store::from(db))
}

async fn run(config: config::Config) -> anyhow::Result<()> {
    let config::Config { port, public_key, bot, generator, pipeline, scheduler, postgres } = config;

    let store = match postgres {
        Some(pg) => connect(pg).await?,
        None => {
            warn!("no database configured; quizzes will be lost on restart");
            Store::from(MemoryStore::default())
        }
    };

    let generator = ChatCompletions::new(&generator.url, &generator.model, generator.key.as_deref(), pipeline.timeout)
        .map_err(|err| anyhow::anyhow!("cannot build the generation client: {err}"))?;
    let verifier = Verifier::from_hex(&public_key).context("PUB_KEY is not a valid Ed25519 public key")?;
    let bot = Bot::new(bot, store, generator, pipeline, scheduler)?;
    let (bot, verifier) = (Arc::new(bot), Arc::new(verifier));

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    info!("listening on port {port}");

    let mut shutdown = pin!(signal::ctrl_c());
    loop {
        let stream = tokio::select! {
            biased;
            result = &mut shutdown => {
                result?;
                break;
            }
            result = listener.accept() => match result {
                Ok((stream, _)) => stream,
                Err(err) => {
                    error!("failed to accept connection: {err}");
                    continue;
                }
            },
        };

        let bot = bot.clone();
        let verifier = verifier.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let bot = bot.clone();
                let verifier = verifier.clone();
                async move { Ok::<_, Infallible>(api::respond(req, &verifier, &bot).await) }
            });
            if let Err(err) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                error!("failed to serve connection: {err}");
            }
        });
    }

    let cancelled = bot.shutdown();
    info!("shutting down after cancelling {cancelled} delivery sessions");
    Ok(())
}
