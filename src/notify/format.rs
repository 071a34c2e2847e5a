//! Message rendering for listing notifications.
//!
//! The rich form uses Telegram MarkdownV2 with link buttons; the plain form
//! is sent when the rich one is rejected and carries the links inline.

use crate::models::Item;
use crate::notify::{Action, OutboundMessage};

const LISTING_BUTTON: &str = "🔗 Открыть объявление";
const CHAT_BUTTON: &str = "💬 Открыть чат";

/// Characters that must be backslash-escaped in MarkdownV2 text.
const MARKDOWN_SPECIAL: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escape text for a MarkdownV2 body.
pub fn escape_markdown(text: &str) -> String {
    escape_with(text, MARKDOWN_SPECIAL)
}

/// Escape text inside an inline code span.
fn escape_code(text: &str) -> String {
    escape_with(text, &['\\', '`'])
}

/// Escape text inside a link target.
fn escape_link(text: &str) -> String {
    escape_with(text, &['\\', ')'])
}

fn escape_with(text: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn actions(item: &Item) -> Vec<Action> {
    let mut actions = vec![Action {
        label: LISTING_BUTTON.to_string(),
        url: item.primary_link().to_string(),
    }];
    if let Some(chat) = item.secondary_link() {
        actions.push(Action {
            label: CHAT_BUTTON.to_string(),
            url: chat.to_string(),
        });
    }
    actions
}

/// Render the MarkdownV2 form.
pub fn rich_message(item: &Item) -> OutboundMessage {
    let mut text = format!(
        "🛋️ *{}*\n\n💰 Цена: `{}`\n🔗 [Посмотреть объявление]({})\n",
        escape_markdown(item.title()),
        escape_code(item.price()),
        escape_link(item.primary_link()),
    );
    if let Some(chat) = item.secondary_link() {
        text.push_str(&format!("📱 [Посмотреть в Telegram]({})\n", escape_link(chat)));
    }
    text.push_str(&format!("\n🆔 ID: {}", escape_markdown(item.id())));

    OutboundMessage {
        text,
        actions: actions(item),
        rich: true,
    }
}

/// Render the unformatted fallback.
pub fn plain_message(item: &Item) -> OutboundMessage {
    let mut text = format!(
        "🛋️ {}\n\n💰 Цена: {}\n🔗 Ссылка: {}\n",
        item.title(),
        item.price(),
        item.primary_link(),
    );
    if let Some(chat) = item.secondary_link() {
        text.push_str(&format!("📱 Telegram: {}\n", chat));
    }
    text.push_str(&format!("\n🆔 ID: {}", item.id()));

    OutboundMessage {
        text,
        actions: Vec::new(),
        rich: false,
    }
}
