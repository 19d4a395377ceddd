mod bot;
mod deliver;
mod fetch;
mod interaction;

pub use bot::{Bot, BotConfig};
pub use deliver::DiscordDelivery;
pub use interaction::{respond, Verifier};
