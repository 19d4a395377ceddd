use engine::{Deliver, DeliveryError};
use log::{error, warn};
use model::{ConversationId, QuizItem};
use std::{fmt::Write, sync::Arc};
use twilight_http::error::ErrorType;
use twilight_model::{
    channel::message::{
        component::{ActionRow, Button, ButtonStyle},
        Component,
    },
    id::{marker::ChannelMarker, Id},
};

const ANSWER_PREFIX: &str = "answer";

fn letter(index: usize) -> char {
    u8::try_from(index).ok().and_then(|index| b'A'.checked_add(index)).map_or('?', char::from)
}

/// Lays out a question as message text plus one button per choice.
pub fn render(item: &QuizItem) -> (String, Vec<Component>) {
    let mut content = format!("**{}**\n", item.question);
    for (index, option) in item.options.iter().enumerate() {
        // Writing into a `String` cannot fail.
        let _ = write!(content, "\n{}) {option}", letter(index));
    }

    let buttons = (0..item.options.len())
        .map(|index| {
            Component::Button(Button {
                custom_id: Some(format!("{ANSWER_PREFIX}:{index}:{}", item.answer)),
                disabled: false,
                emoji: None,
                label: Some(letter(index).to_string()),
                style: ButtonStyle::Primary,
                url: None,
            })
        })
        .collect();

    (content, vec![Component::ActionRow(ActionRow { components: buttons })])
}

/// Recovers the `(choice, answer)` pair from a button's custom ID.
pub fn parse_answer(custom_id: &str) -> Option<(u8, u8)> {
    let mut iter = custom_id.split(':');
    if iter.next() != Some(ANSWER_PREFIX) {
        return None;
    }

    let choice = iter.next()?.parse().ok()?;
    let answer = iter.next()?.parse().ok()?;
    iter.next().is_none().then_some((choice, answer))
}

pub fn answer_letter(answer: u8) -> char {
    letter(usize::from(answer))
}

/// Posts quiz items as channel messages. Conversations are channel IDs.
pub struct DiscordDelivery {
    client: Arc<twilight_http::Client>,
}

impl From<Arc<twilight_http::Client>> for DiscordDelivery {
    fn from(client: Arc<twilight_http::Client>) -> Self {
        Self { client }
    }
}

impl Deliver for DiscordDelivery {
    async fn deliver(&self, conversation: &ConversationId, item: &QuizItem) -> Result<(), DeliveryError> {
        let Ok(channel) = conversation.as_str().parse::<Id<ChannelMarker>>() else {
            error!("conversation {conversation} is not a channel");
            return Err(DeliveryError::Unrecoverable);
        };

        let (content, components) = render(item);
        let request = self.client.create_message(channel).content(&content).and_then(|req| req.components(&components));
        let request = match request {
            Ok(request) => request,
            // The same item fails the same way on every tick.
            Err(err) => {
                error!("question cannot be posted to channel {channel}: {err}");
                return Err(DeliveryError::Unrecoverable);
            }
        };

        match request.await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!("failed to post a question to channel {channel}: {err}");
                Err(classify(err.kind()))
            }
        }
    }
}

fn classify(kind: &ErrorType) -> DeliveryError {
    match kind {
        ErrorType::Unauthorized => DeliveryError::Unrecoverable,
        ErrorType::Response { status, .. } if matches!(status.get(), 403 | 404) => DeliveryError::Unrecoverable,
        _ => DeliveryError::Transient,
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, parse_answer, render, DiscordDelivery};
    use engine::{Deliver, DeliveryError};
    use model::{ConversationId, QuizItem};
    use std::sync::Arc;
    use twilight_http::error::ErrorType;
    use twilight_model::channel::message::Component;

    #[test]
    fn renders_one_button_per_choice() {
        let item = QuizItem {
            question: String::from("When was Rome founded?"),
            options: vec![String::from("753 BC"), String::from("476 AD"), String::from("1453 AD")],
            answer: 0,
        };

        let (content, components) = render(&item);
        assert_eq!(content, "**When was Rome founded?**\n\nA) 753 BC\nB) 476 AD\nC) 1453 AD");

        let [Component::ActionRow(row)] = components.as_slice() else { panic!("expected a single action row") };
        let ids: Vec<_> = row
            .components
            .iter()
            .map(|component| match component {
                Component::Button(button) => button.custom_id.clone().unwrap(),
                _ => panic!("expected buttons only"),
            })
            .collect();
        assert_eq!(ids, ["answer:0:0", "answer:1:0", "answer:2:0"]);
    }

    #[test]
    fn parses_answer_ids() {
        assert_eq!(parse_answer("answer:2:1"), Some((2, 1)));
        assert_eq!(parse_answer("answer:2"), None);
        assert_eq!(parse_answer("answer:2:1:0"), None);
        assert_eq!(parse_answer("vote:2:1"), None);
        assert_eq!(parse_answer("answer:x:1"), None);
    }

    #[tokio::test]
    async fn oversized_questions_are_unrecoverable() {
        let delivery = DiscordDelivery::from(Arc::new(twilight_http::Client::new(String::from("token"))));
        let item = QuizItem {
            question: "Why? ".repeat(500),
            options: vec![String::from("yes"), String::from("no")],
            answer: 0,
        };
        let result = delivery.deliver(&ConversationId::from("1234"), &item).await;
        assert_eq!(result, Err(DeliveryError::Unrecoverable));
    }

    #[tokio::test]
    async fn malformed_channels_are_unrecoverable() {
        let delivery = DiscordDelivery::from(Arc::new(twilight_http::Client::new(String::from("token"))));
        let item = QuizItem { question: String::from("Q?"), options: vec![String::from("a"), String::from("b")], answer: 0 };
        let result = delivery.deliver(&ConversationId::from("general"), &item).await;
        assert_eq!(result, Err(DeliveryError::Unrecoverable));
    }

    #[test]
    fn only_permanent_failures_are_unrecoverable() {
        assert_eq!(classify(&ErrorType::Unauthorized), DeliveryError::Unrecoverable);
        assert_eq!(classify(&ErrorType::RequestTimedOut), DeliveryError::Transient);
        assert_eq!(classify(&ErrorType::RequestCanceled), DeliveryError::Transient);
    }
}
