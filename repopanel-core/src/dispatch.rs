use std::collections::HashMap;

use crate::{CoreError, Effect, HostMessage, Message, Protocol, Store};

pub type Handler<T> = Box<dyn Fn(&mut T, &Message) -> Result<Vec<Effect>, CoreError> + Send + Sync>;

/// Outcome of routing one inbound message.
#[derive(Debug)]
pub enum Dispatch {
    Applied(Vec<Effect>),
    /// No handler for the command. Expected for newer hosts; not an error.
    Ignored,
    /// The handler could not read the payload. Callers log and drop.
    Rejected(CoreError),
}

/// Routes messages to exactly one handler per command tag.
pub struct Dispatcher<T> {
    handlers: HashMap<String, Handler<T>>,
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<T> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut commands: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        commands.sort_unstable();
        f.debug_struct("Dispatcher")
            .field("commands", &commands)
            .finish()
    }
}

impl<T> Dispatcher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `command`, replacing any previous handler.
    /// Returns true when one was replaced.
    pub fn register<F>(&mut self, command: &str, handler: F) -> bool
    where
        F: Fn(&mut T, &Message) -> Result<Vec<Effect>, CoreError> + Send + Sync + 'static,
    {
        self.handlers
            .insert(command.to_owned(), Box::new(handler))
            .is_some()
    }

    pub fn is_registered(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    pub fn dispatch(&self, target: &mut T, message: &Message) -> Dispatch {
        match self.handlers.get(message.command()) {
            Some(handler) => match handler(target, message) {
                Ok(effects) => Dispatch::Applied(effects),
                Err(err) => Dispatch::Rejected(err),
            },
            None => Dispatch::Ignored,
        }
    }
}

impl Dispatcher<Store> {
    /// Every host command routed into the store's reducer.
    pub fn for_panel() -> Self {
        let mut dispatcher = Self::new();
        for command in HostMessage::COMMANDS {
            dispatcher.register(command, apply_host_message);
        }
        dispatcher
    }
}

fn apply_host_message(store: &mut Store, message: &Message) -> Result<Vec<Effect>, CoreError> {
    match HostMessage::from_message(message)? {
        Some(typed) => Ok(store.apply(typed)),
        None => Ok(Vec::new()),
    }
}
