//! Command responder - static command table and reply texts
//!
//! The responder is a pure function from (token, argument) to a reply
//! string. It performs no I/O and is total: every token yields some reply,
//! and no argument value can make it fail.

use crate::domain::entities::{Command, CommandRegistry, Message, Content};

/// Reply for tokens outside the command table.
pub const UNKNOWN_COMMAND_REPLY: &str =
    "❌ Unknown command. Type .menu for available commands.";

struct SearchTarget {
    name: &'static str,
    emoji: &'static str,
    label: &'static str,
    description: &'static str,
    example: &'static str,
    url_base: &'static str,
}

const SEARCH_TARGETS: &[SearchTarget] = &[
    SearchTarget {
        name: "movie",
        emoji: "🎬",
        label: "Movie Search",
        description: "Search movies",
        example: "avengers",
        url_base: "https://www.themoviedb.org/search?query=",
    },
    SearchTarget {
        name: "yt",
        emoji: "📺",
        label: "YouTube Search",
        description: "Search YouTube",
        example: "funny cats",
        url_base: "https://www.youtube.com/results?search_query=",
    },
    SearchTarget {
        name: "gg",
        emoji: "🔍",
        label: "Google Search",
        description: "Search Google",
        example: "weather today",
        url_base: "https://www.google.com/search?q=",
    },
    SearchTarget {
        name: "tt",
        emoji: "📱",
        label: "TikTok Search",
        description: "Search TikTok",
        example: "dance tutorial",
        url_base: "https://www.tiktok.com/search?q=",
    },
];

/// Service for managing and executing commands
pub struct CommandService {
    registry: CommandRegistry,
    prefix: String,
}

impl CommandService {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            registry: CommandRegistry::new(),
            prefix: prefix.into(),
        }
    }

    pub fn register(&mut self, command: Command) {
        self.registry.register(command);
    }

    /// Register the built-in command table: the four search commands,
    /// `ping`, and a `menu` composed from whatever is registered so far.
    pub fn register_defaults(&mut self, channel_url: &str) {
        let prefix = self.prefix.clone();
        for target in SEARCH_TARGETS {
            self.register(Self::search_command(&prefix, target));
        }

        let ping_reply = format!(
            "🏓 Bot is active!\n\n📢 WhatsApp Channel:\n{}\n\nType {}menu for all commands",
            channel_url, self.prefix
        );
        self.register(Command::new("ping")
            .with_description("Bot status")
            .with_usage(format!("🏓 {}ping", self.prefix))
            .with_handler(move |_| ping_reply.clone()));

        let menu_reply = self.menu_text();
        self.register(Command::new("menu")
            .with_description("Show this menu")
            .with_usage(format!("📖 {}menu", self.prefix))
            .with_handler(move |_| menu_reply.clone()));
    }

    fn search_command(prefix: &str, target: &'static SearchTarget) -> Command {
        let usage_reply = format!(
            "{} Usage: {}{} <query>\nExample: {}{} {}",
            target.emoji, prefix, target.name, prefix, target.name, target.example
        );
        Command::new(target.name)
            .with_description(target.description)
            .with_usage(format!("{} {}{} <query>", target.emoji, prefix, target.name))
            .with_handler(move |arg: &str| {
                if arg.is_empty() {
                    usage_reply.clone()
                } else {
                    format!(
                        "{} {}: \"{}\"\n🔗 {}{}",
                        target.emoji,
                        target.label,
                        arg,
                        target.url_base,
                        urlencoding::encode(arg)
                    )
                }
            })
    }

    /// Menu text listing every registered command plus the menu entry
    /// itself (registered after this is computed).
    fn menu_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.registry.len() + 1);
        for cmd in self.registry.all() {
            let usage = cmd.usage.as_deref().unwrap_or(&cmd.name);
            let desc = cmd.description.as_deref().unwrap_or("");
            lines.push(format!("{} - {}", usage, desc));
        }
        lines.push(format!("📖 {}menu - Show this menu", self.prefix));
        format!("🤖 BOT MENU 🤖\n\n{}", lines.join("\n"))
    }

    /// Produce the reply for a command token and its argument.
    pub fn respond(&self, name: &str, arg: &str) -> String {
        match self.registry.find(name).and_then(|c| c.handler.as_ref()) {
            Some(handler) => handler(arg),
            None => UNKNOWN_COMMAND_REPLY.to_string(),
        }
    }

    /// Reply to a parsed message, or `None` if it is not a command.
    pub fn handle(&self, message: &Message) -> Option<String> {
        let Content::Command { name, arg } = &message.content else {
            return None;
        };
        Some(self.respond(name, arg))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}
