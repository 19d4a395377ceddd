use anyhow::Context;
use api::BotConfig;
use core::{num::NonZeroU64, str::FromStr, time::Duration};
use engine::{PipelineConfig, SchedulerConfig};

pub struct Postgres {
    pub host: String,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

pub struct Generator {
    pub url: String,
    pub model: String,
    pub key: Option<String>,
}

pub struct Config {
    pub port: u16,
    /// Hex-encoded Ed25519 key that signs incoming interactions.
    pub public_key: String,
    pub bot: BotConfig,
    pub generator: Generator,
    pub pipeline: PipelineConfig,
    pub scheduler: SchedulerConfig,
    /// Present only when every `PG_*` variable is set.
    pub postgres: Option<Postgres>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let require = |name: &str| lookup(name).with_context(|| format!("missing environment variable {name}"));
        let optional = |name: &str| lookup(name).map(|value| value.trim().to_owned()).filter(|value| !value.is_empty());

        let port = parse(&require("PORT")?, "PORT")?;
        let app = parse(&require("APP_ID")?, "APP_ID")?;
        let token = require("TOKEN")?;
        let public_key = require("PUB_KEY")?;

        let admins = optional("ADMIN_IDS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| parse::<NonZeroU64>(id, "ADMIN_IDS"))
            .collect::<anyhow::Result<_>>()?;

        let PipelineConfig { max_chars, option_count, timeout } = PipelineConfig::default();
        let SchedulerConfig { interval } = SchedulerConfig::default();
        let or_default = |name: &str, default: u64| match optional(name) {
            Some(value) => parse(&value, name),
            None => Ok(default),
        };

        let timeout = or_default("GENERATION_TIMEOUT", timeout.as_secs())?;
        let interval = or_default("DELIVERY_INTERVAL", interval.as_secs())?;
        anyhow::ensure!(timeout > 0, "GENERATION_TIMEOUT must be positive");
        anyhow::ensure!(interval > 0, "DELIVERY_INTERVAL must be positive");

        let max_chars = or_default("MAX_CHARS", max_chars as u64)?;
        anyhow::ensure!(max_chars > 0, "MAX_CHARS must be positive");
        let option_count = or_default("OPTION_COUNT", option_count as u64)?;

        let pipeline = PipelineConfig {
            max_chars: usize::try_from(max_chars).context("MAX_CHARS is too large")?,
            option_count: usize::try_from(option_count).context("OPTION_COUNT is too large")?,
            timeout: Duration::from_secs(timeout),
        };

        let generator = Generator {
            url: require("GENERATOR_URL")?,
            model: optional("GENERATOR_MODEL").unwrap_or_else(|| String::from("gpt-4o-mini")),
            key: optional("GENERATOR_KEY"),
        };

        let postgres = match (optional("PG_HOSTNAME"), optional("PG_USERNAME"), lookup("PG_PASSWORD"), optional("PG_DATABASE")) {
            (Some(host), Some(user), Some(password), Some(dbname)) => Some(Postgres { host, user, password, dbname }),
            _ => None,
        };

        Ok(Self {
            port,
            public_key,
            bot: BotConfig {
                app,
                token,
                admins,
                max_document_bytes: or_default("MAX_DOCUMENT_BYTES", 1 << 20)?,
            },
            generator,
            pipeline,
            scheduler: SchedulerConfig { interval: Duration::from_secs(interval) },
            postgres,
        })
    }
}

fn parse<T>(value: &str, name: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.trim().parse().with_context(|| format!("invalid value for {name}"))
}
