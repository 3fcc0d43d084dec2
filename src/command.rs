//! Chat command interpreter
//!
//! Turns free text addressed to the bot into a [`TradeIntent`]. Parsing is
//! pure and total: anything that does not fit the grammar is
//! `Unrecognized`, never an error.
//!
//! Grammar, tried in order on the trimmed, lowercased text:
//!
//! ```text
//! *help*                      -> Help (matches anywhere in the text)
//! i have <n>...               -> Have
//! i need <n>...               -> Need
//! i traded <n>... for <n>...  -> Traded
//! ```

use crate::event::{CallbackEvent, CallbackType};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Reply for `Help`
pub const HELP_TEXT: &str = "Jamf the Gathering helps you find other JNUC attendees on \
Slack who have cards to trade with you in your quest to complete the full set of 18!\n\n\
Just send me the following commands to say which cards you have and which cards you need:\n\n\
```\nI have 1 2 3\nI need 4 5 6```\n\
As you make trades, you can report them and update your available cards using:\n\
```I traded 1 2 for 4 5```\n\
To find other users to trade with, type:```Show trades```\n\
To see what cards you have flagged as have or need, type:\n```show mine```";

/// Reply for anything the grammar does not cover
pub const FALLBACK_TEXT: &str =
    "I'm sorry, I'm not sure what you wanted me to do? Type 'Help' to learn how I work!";

/// Parsed chat command
///
/// Card numbers are sets: duplicates collapse and order is irrelevant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeIntent {
    Have(BTreeSet<u32>),
    Need(BTreeSet<u32>),
    Traded { give: BTreeSet<u32>, get: BTreeSet<u32> },
    Help,
    Unrecognized,
}

impl TradeIntent {
    /// True for `Have`, `Need` and `Traded`
    pub fn is_trade(&self) -> bool {
        matches!(
            self,
            TradeIntent::Have(_) | TradeIntent::Need(_) | TradeIntent::Traded { .. }
        )
    }
}

fn have_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^i\s+have\s+([0-9]+(?:\s+[0-9]+)*)$").unwrap())
}

fn need_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^i\s+need\s+([0-9]+(?:\s+[0-9]+)*)$").unwrap())
}

fn traded_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^i\s+traded\s+([0-9]+(?:\s+[0-9]+)*)\s+for\s+([0-9]+(?:\s+[0-9]+)*)$")
            .unwrap()
    })
}

/// Interpret a chat command
pub fn interpret(text: &str) -> TradeIntent {
    let text = text.trim().to_lowercase();

    if text.contains("help") {
        return TradeIntent::Help;
    }

    if let Some(caps) = have_regex().captures(&text) {
        return parse_numbers(&caps[1]).map_or(TradeIntent::Unrecognized, TradeIntent::Have);
    }

    if let Some(caps) = need_regex().captures(&text) {
        return parse_numbers(&caps[1]).map_or(TradeIntent::Unrecognized, TradeIntent::Need);
    }

    if let Some(caps) = traded_regex().captures(&text) {
        return match (parse_numbers(&caps[1]), parse_numbers(&caps[2])) {
            (Some(give), Some(get)) => TradeIntent::Traded { give, get },
            _ => TradeIntent::Unrecognized,
        };
    }

    TradeIntent::Unrecognized
}

/// Whitespace-separated numbers; `None` if any of them overflows
fn parse_numbers(digits: &str) -> Option<BTreeSet<u32>> {
    digits
        .split_whitespace()
        .map(|n| n.parse::<u32>().ok())
        .collect()
}

/// Fixed reply for an intent, if it has one
///
/// Trade intents have none; they are handed to a trade handler instead.
pub fn reply_for(intent: &TradeIntent) -> Option<&'static str> {
    match intent {
        TradeIntent::Help => Some(HELP_TEXT),
        TradeIntent::Unrecognized => Some(FALLBACK_TEXT),
        _ => None,
    }
}

/// Command text carried by a user event
///
/// Mentions start with the bot's `<@U...>` token, which is dropped. Returns
/// `None` for events that do not carry commands.
pub fn command_text(event: &CallbackEvent) -> Option<String> {
    let text = event.text.as_deref()?;
    match event.kind {
        CallbackType::AppMention => {
            let text = text.trim_start();
            let rest = text
                .split_once(char::is_whitespace)
                .map_or(text, |(_, rest)| rest);
            Some(rest.to_string())
        }
        CallbackType::Message => Some(text.to_string()),
        _ => None,
    }
}
