mod error;

use crate::{deliver, fetch, DiscordDelivery};
use core::{num::NonZeroU64, time::Duration};
use db::{QuizStore, Store};
use engine::{ChatCompletions, Documents, PipelineConfig, SchedulerConfig};
use log::{error, info, warn};
use model::ConversationId;
use reqwest::Url;
use std::{collections::BTreeSet, sync::Arc};
use twilight_model::{
    application::interaction::{
        application_command::{CommandData, CommandDataOption, CommandOptionValue},
        Interaction, InteractionData, InteractionType,
    },
    channel::message::{
        embed::{EmbedAuthor, EmbedField},
        Embed, MessageFlags,
    },
    http::interaction::{InteractionResponse, InteractionResponseData, InteractionResponseType},
    id::{
        marker::{ApplicationMarker, AttachmentMarker, ChannelMarker, UserMarker},
        Id,
    },
};

type AppId = Id<ApplicationMarker>;
type UserId = Id<UserMarker>;
type Pipeline = engine::Pipeline<Store, ChatCompletions, Documents>;
type Scheduler = engine::Scheduler<Store, DiscordDelivery>;

/// Static settings for the Discord transport.
pub struct BotConfig {
    pub app: NonZeroU64,
    pub token: String,
    /// Users allowed to ingest and delete quizzes.
    pub admins: Vec<NonZeroU64>,
    /// Size cap for uploaded documents.
    pub max_document_bytes: u64,
}

struct Inner {
    client: Arc<twilight_http::Client>,
    http: reqwest::Client,
    store: Arc<Store>,
    pipeline: Pipeline,
    scheduler: Scheduler,
    admins: BTreeSet<UserId>,
    max_document_bytes: u64,
    interval: Duration,
}

pub struct Bot {
    inner: Arc<Inner>,
    id: AppId,
}

fn ephemeral(content: String) -> InteractionResponse {
    InteractionResponse {
        kind: InteractionResponseType::ChannelMessageWithSource,
        data: Some(InteractionResponseData {
            content: Some(content),
            flags: Some(MessageFlags::EPHEMERAL),
            ..Default::default()
        }),
    }
}

impl Bot {
    pub fn new(
        config: BotConfig,
        store: Store,
        generator: ChatCompletions,
        pipeline: PipelineConfig,
        scheduler: SchedulerConfig,
    ) -> Result<Self, reqwest::Error> {
        let BotConfig { app, token, admins, max_document_bytes } = config;
        let client = Arc::new(twilight_http::Client::new(token));
        let http = reqwest::Client::builder().https_only(true).timeout(Duration::from_secs(30)).build()?;
        let store = Arc::new(store);
        let inner = Inner {
            pipeline: engine::Pipeline::new(store.clone(), generator, Documents, pipeline),
            scheduler: engine::Scheduler::new(store.clone(), DiscordDelivery::from(client.clone()), scheduler),
            admins: admins.into_iter().map(Id::from).collect(),
            interval: scheduler.interval,
            client,
            http,
            store,
            max_document_bytes,
        };
        Ok(Self { inner: Arc::new(inner), id: Id::from(app) })
    }

    /// Cancels every running delivery session. Returns how many were running.
    pub fn shutdown(&self) -> usize {
        self.inner.scheduler.shutdown()
    }

    pub async fn on_message(&self, interaction: Interaction) -> InteractionResponse {
        let result = match interaction.kind {
            InteractionType::Ping => Ok(InteractionResponse { kind: InteractionResponseType::Pong, data: None }),
            InteractionType::ApplicationCommand => self.on_app_command(interaction).await,
            InteractionType::MessageComponent => self.on_msg_component(interaction),
            _ => Err(error::Error::UnsupportedInteraction),
        };

        match result {
            Ok(res) => res,
            Err(err) => ephemeral(err.to_string()),
        }
    }

    async fn on_app_command(&self, interaction: Interaction) -> error::Result<InteractionResponse> {
        let user =
            interaction.member.and_then(|member| member.user).xor(interaction.user).ok_or(error::Error::UnknownUser)?;
        let data = interaction.data.ok_or(error::Error::InvalidParams)?;
        let InteractionData::ApplicationCommand(data) = data else {
            return Err(error::Error::InvalidParams);
        };

        #[allow(deprecated)]
        let channel = interaction.channel_id;
        let token = interaction.token.into_boxed_str();
        let CommandData { name, options, resolved, .. } = *data;

        match name.as_str() {
            "list" => self.on_list_command().await,
            "start" => self.on_start_command(channel, &options).await,
            "stop" => self.on_stop_command(channel),
            "ingest" => {
                self.ensure_admin(user.id)?;
                let [CommandDataOption { name, value: CommandOptionValue::Attachment(id) }] = options.as_slice() else {
                    return Err(error::Error::InvalidParams);
                };
                if name.as_str() != "file" {
                    return Err(error::Error::UnknownCommandName);
                }
                let attachment = resolved
                    .as_ref()
                    .and_then(|resolved| resolved.attachments.get(id))
                    .ok_or(error::Error::InvalidParams)?;
                self.on_ingest_command(*id, &attachment.url, &attachment.filename, attachment.size, token)
            }
            "delete" => {
                self.ensure_admin(user.id)?;
                self.on_delete_command(&options).await
            }
            "help" => Ok(Self::on_help_command()),
            _ => Err(error::Error::UnknownCommandName),
        }
    }

    fn ensure_admin(&self, user: UserId) -> error::Result<()> {
        if self.inner.admins.contains(&user) {
            Ok(())
        } else {
            Err(error::Error::Forbidden)
        }
    }

    async fn on_list_command(&self) -> error::Result<InteractionResponse> {
        let names = self.inner.store.list().await.map_err(|_| error::Error::Fatal)?;
        let content = if names.is_empty() {
            String::from("No quizzes have been ingested yet.")
        } else {
            let lines: Vec<_> = names.iter().map(|name| format!("- `{name}`")).collect();
            format!("Available quizzes:\n{}", lines.join("\n"))
        };
        Ok(ephemeral(content))
    }

    async fn on_start_command(
        &self,
        channel: Option<Id<ChannelMarker>>,
        options: &[CommandDataOption],
    ) -> error::Result<InteractionResponse> {
        let channel = channel.ok_or(error::Error::UnknownChannel)?;
        let [CommandDataOption { name, value: CommandOptionValue::String(quiz) }] = options else {
            return Err(error::Error::InvalidParams);
        };

        if name.as_str() != "quiz" {
            return Err(error::Error::UnknownCommandName);
        }

        let conversation = ConversationId::from(channel.to_string());
        self.inner.scheduler.start(conversation, quiz).await?;

        let seconds = self.inner.interval.as_secs();
        Ok(InteractionResponse {
            kind: InteractionResponseType::ChannelMessageWithSource,
            data: Some(InteractionResponseData {
                content: Some(format!(
                    "A question from `{quiz}` will be posted here every {seconds} seconds. Use `/stop` to end."
                )),
                ..Default::default()
            }),
        })
    }

    fn on_stop_command(&self, channel: Option<Id<ChannelMarker>>) -> error::Result<InteractionResponse> {
        let channel = channel.ok_or(error::Error::UnknownChannel)?;
        let conversation = ConversationId::from(channel.to_string());
        if !self.inner.scheduler.cancel(&conversation) {
            return Err(error::Error::NoSession);
        }

        Ok(InteractionResponse {
            kind: InteractionResponseType::ChannelMessageWithSource,
            data: Some(InteractionResponseData {
                content: Some(String::from("No more questions will be posted here.")),
                ..Default::default()
            }),
        })
    }

    fn on_ingest_command(
        &self,
        attachment: Id<AttachmentMarker>,
        url: &str,
        filename: &str,
        size: u64,
        token: Box<str>,
    ) -> error::Result<InteractionResponse> {
        let url = Url::parse(url).map_err(|_| error::Error::UntrustedAttachment)?;
        if !fetch::is_allowed_url(&url) {
            return Err(error::Error::UntrustedAttachment);
        }

        if size > self.inner.max_document_bytes {
            return Err(error::Error::DocumentTooLarge);
        }

        info!("ingesting attachment {attachment} ({filename})");
        let source = Box::<str>::from(filename);
        let inner = self.inner.clone();
        let app_id = self.id;
        tokio::spawn(async move {
            let content = match inner.ingest(url, &source).await {
                Ok(name) => format!("Quiz `{name}` is ready. Use `/start quiz:{name}` to begin."),
                Err(err) => {
                    warn!("ingestion of {source} failed: {err}");
                    err.to_string()
                }
            };

            let client = inner.client.interaction(app_id);
            let result = match client.create_followup(&token).content(&content) {
                Ok(followup) => followup.await.map(drop).map_err(|err| err.to_string()),
                Err(err) => Err(err.to_string()),
            };

            if let Err(err) = result {
                error!("failed to report ingestion of {source}: {err}");
            }
        });

        Ok(InteractionResponse {
            kind: InteractionResponseType::DeferredChannelMessageWithSource,
            data: Some(InteractionResponseData { flags: Some(MessageFlags::EPHEMERAL), ..Default::default() }),
        })
    }

    async fn on_delete_command(&self, options: &[CommandDataOption]) -> error::Result<InteractionResponse> {
        let [CommandDataOption { name, value: CommandOptionValue::String(quiz) }] = options else {
            return Err(error::Error::InvalidParams);
        };

        if name.as_str() != "quiz" {
            return Err(error::Error::UnknownCommandName);
        }

        if !self.inner.store.delete(quiz).await.map_err(|_| error::Error::Fatal)? {
            return Err(error::Error::UnknownQuiz);
        }

        info!("deleted quiz {quiz}");
        Ok(ephemeral(format!("Quiz `{quiz}` has been deleted.")))
    }

    fn on_help_command() -> InteractionResponse {
        let fields = [
            ("`/list`", "List the quizzes that can be started."),
            ("`/start quiz:<name>`", "Post a random question from the quiz in this channel at a fixed interval."),
            ("`/stop`", "Stop posting questions in this channel."),
            ("`/ingest file:<attachment>`", "Build a quiz from a `.pdf`, `.txt` or `.md` document. Administrators only."),
            ("`/delete quiz:<name>`", "Remove a quiz. Administrators only."),
            ("`/help`", "Summon this help menu."),
        ]
        .into_iter()
        .map(|(name, value)| EmbedField { inline: false, name: String::from(name), value: String::from(value) })
        .collect();

        InteractionResponse {
            kind: InteractionResponseType::ChannelMessageWithSource,
            data: Some(InteractionResponseData {
                flags: Some(MessageFlags::EPHEMERAL),
                embeds: Some(Vec::from([Embed {
                    author: Some(EmbedAuthor {
                        name: String::from("Quizcast"),
                        icon_url: None,
                        proxy_icon_url: None,
                        url: None,
                    }),
                    color: Some(0x236EA5),
                    title: Some(String::from("Quizcast Help")),
                    description: Some(String::from("Quizcast turns documents into quizzes and posts them on a schedule.")),
                    fields,
                    kind: String::from("rich"),
                    footer: None,
                    image: None,
                    provider: None,
                    thumbnail: None,
                    timestamp: None,
                    url: None,
                    video: None,
                }])),
                ..Default::default()
            }),
        }
    }

    fn on_msg_component(&self, interaction: Interaction) -> error::Result<InteractionResponse> {
        let data = interaction.data.ok_or(error::Error::InvalidParams)?;
        let InteractionData::MessageComponent(data) = data else {
            return Err(error::Error::InvalidParams);
        };

        let (choice, answer) = deliver::parse_answer(&data.custom_id).ok_or(error::Error::InvalidParams)?;
        let content = if choice == answer {
            String::from("Correct!")
        } else {
            format!("Not quite. The correct answer is **{}**.", deliver::answer_letter(answer))
        };

        Ok(ephemeral(content))
    }
}

impl Inner {
    /// Downloads and ingests an attachment. Returns the name of the stored quiz.
    async fn ingest(&self, url: Url, source: &str) -> error::Result<Box<str>> {
        let blob = fetch::download(&self.http, url, self.max_document_bytes).await.map_err(|err| match err {
            fetch::Error::Untrusted => error::Error::UntrustedAttachment,
            fetch::Error::TooLarge => error::Error::DocumentTooLarge,
            fetch::Error::Network => error::Error::Download,
        })?;
        self.build(source, &blob).await
    }

    /// Every pipeline failure, storage included, is reported as a failed build.
    async fn build(&self, source: &str, blob: &[u8]) -> error::Result<Box<str>> {
        let quiz = self.pipeline.ingest_document(source, blob).await.map_err(error::Error::Ingest)?;
        Ok(quiz.name().into())
    }
}

#[cfg(test)]
mod tests {
    use super::{error::Error, Bot, BotConfig};
    use core::num::NonZeroU64;
    use db::{MemoryStore, QuizStore, Store};
    use engine::{ChatCompletions, PipelineConfig, SchedulerConfig};
    use model::QuizItem;

    fn bot(store: Store) -> Bot {
        let config = BotConfig {
            app: NonZeroU64::new(1).unwrap(),
            token: String::from("token"),
            admins: vec![NonZeroU64::new(42).unwrap()],
            max_document_bytes: 1024,
        };
        let generator = ChatCompletions::new("http://127.0.0.1:9/v1", "test", None, core::time::Duration::from_secs(1)).unwrap();
        Bot::new(config, store, generator, PipelineConfig::default(), SchedulerConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn only_admins_pass_the_gate() {
        let bot = bot(Store::from(MemoryStore::default()));
        assert!(bot.ensure_admin(twilight_model::id::Id::new(42)).is_ok());
        assert!(matches!(bot.ensure_admin(twilight_model::id::Id::new(7)), Err(Error::Forbidden)));
    }

    #[tokio::test]
    async fn starting_unknown_quizzes_reports_not_found() {
        use twilight_model::application::interaction::application_command::{CommandDataOption, CommandOptionValue};
        let bot = bot(Store::from(MemoryStore::default()));
        let options = [CommandDataOption { name: String::from("quiz"), value: CommandOptionValue::String(String::from("nope")) }];
        let err = bot.on_start_command(Some(twilight_model::id::Id::new(5)), &options).await.unwrap_err();
        assert_eq!(err.to_string(), "Quiz not found.");
        assert_eq!(bot.inner.scheduler.active_count(), 0);
    }

    #[tokio::test]
    async fn starting_and_stopping_sessions() {
        use twilight_model::application::interaction::application_command::{CommandDataOption, CommandOptionValue};
        let store = MemoryStore::default();
        let item = QuizItem { question: String::from("Q?"), options: vec![String::from("a"), String::from("b")], answer: 1 };
        store.put("history", vec![item]).await.unwrap();

        let bot = bot(Store::from(store));
        let channel = Some(twilight_model::id::Id::new(5));
        let options =
            [CommandDataOption { name: String::from("quiz"), value: CommandOptionValue::String(String::from("history")) }];
        bot.on_start_command(channel, &options).await.unwrap();
        assert_eq!(bot.inner.scheduler.active_count(), 1);

        bot.on_stop_command(channel).unwrap();
        assert_eq!(bot.shutdown(), 0);
        assert!(matches!(bot.on_stop_command(channel), Err(Error::NoSession)));
    }

    #[tokio::test]
    async fn ingestion_failures_read_as_failed_builds() {
        let bot = bot(Store::from(MemoryStore::default()));
        let err = bot.inner.build("empty.txt", b"   ").await.unwrap_err();
        assert!(matches!(err, Error::Ingest(engine::Error::EmptyInput)));
        assert!(err.to_string().starts_with("Could not build quiz."));

        let err = Error::Ingest(engine::Error::Store);
        assert_eq!(err.to_string(), "Could not build quiz. We encountered an unexpected storage error on our end.");
    }

    #[tokio::test]
    async fn lists_quiz_names() {
        let store = MemoryStore::default();
        let item = QuizItem { question: String::from("Q?"), options: vec![String::from("a"), String::from("b")], answer: 0 };
        store.put("rome", vec![item.clone()]).await.unwrap();
        store.put("greece", vec![item]).await.unwrap();

        let bot = bot(Store::from(store));
        let res = bot.on_list_command().await.unwrap();
        let content = res.data.and_then(|data| data.content).unwrap();
        assert_eq!(content, "Available quizzes:\n- `greece`\n- `rome`");
    }
}
