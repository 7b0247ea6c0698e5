use std::collections::HashMap;

/// Represents a bot command
pub struct Command {
    pub name: String,
    pub description: Option<String>,
    pub usage: Option<String>,
    pub handler: Option<CommandHandler>,
}

/// Command handler function type
///
/// Handlers receive the trimmed free-text argument and must always produce
/// a reply; no argument value may surface as an error to the chat.
pub type CommandHandler = Box<dyn Fn(&str) -> String + Send + Sync>;

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            usage: None,
            handler: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn matches(&self, input: &str) -> bool {
        self.name.eq_ignore_ascii_case(input)
    }
}

/// Command registry for managing available commands
///
/// Lookup is exact-match against a closed set; there is no prefix or
/// fuzzy matching.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
    order: Vec<String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, command: Command) {
        if !self.commands.contains_key(&command.name) {
            self.order.push(command.name.clone());
        }
        self.commands.insert(command.name.clone(), command);
    }

    pub fn find(&self, input: &str) -> Option<&Command> {
        self.commands.values().find(|c| c.matches(input))
    }

    /// All commands in registration order.
    pub fn all(&self) -> impl Iterator<Item = &Command> {
        self.order.iter().filter_map(|name| self.commands.get(name))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }
}
