//! Tab completion.

use cobble_protocol::packets::play::clientbound::Suggestion;
use cobble_protocol::{Str, Text};
use cobble_session::ConnectionData;

/// Completions for the text a player has typed so far.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestions {
    /// Character offset of the span the matches replace.
    pub start: usize,
    /// Length of that span in characters.
    pub length: usize,
    pub matches: Vec<Suggestion>,
}

impl Suggestions {
    /// Completions for the last word of `input`.
    ///
    /// Offsets count the leading slash the client includes.
    pub fn for_last_word(input: &str, candidates: impl IntoIterator<Item = String>) -> Self {
        let word_start = input.rfind(' ').map_or(0, |i| i + 1);
        let word = &input[word_start..];
        let prefix = word.strip_prefix('/').unwrap_or(word);
        let start = input[..word_start].chars().count() + (word.len() - prefix.len());
        let matches = candidates
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .map(|text| Suggestion {
                text: Str::from(text.as_str()),
                tooltip: None,
            })
            .collect();
        Self {
            start,
            length: prefix.chars().count(),
            matches,
        }
    }

    /// Adds a tooltip to the match whose text is `text`.
    pub fn with_tooltip(mut self, text: &str, tooltip: Text) -> Self {
        if let Some(m) = self.matches.iter_mut().find(|m| m.text.as_str() == text) {
            m.tooltip = Some(tooltip);
        }
        self
    }
}

/// Answers command suggestion requests.
///
/// Only the command channel consults it; packets never reach it directly.
pub trait CommandSuggester: Send + Sync + 'static {
    /// Completions for `command` as typed, slash included. `None` sends no
    /// answer.
    fn suggest(&self, data: &ConnectionData, command: &str) -> Option<Suggestions>;
}

/// Completes the first word from a fixed list of command names.
#[derive(Debug, Clone, Default)]
pub struct StaticSuggester {
    commands: Vec<String>,
}

impl StaticSuggester {
    pub fn new(commands: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut commands: Vec<String> = commands.into_iter().map(Into::into).collect();
        commands.sort();
        Self { commands }
    }
}

impl CommandSuggester for StaticSuggester {
    fn suggest(&self, _data: &ConnectionData, command: &str) -> Option<Suggestions> {
        if command.contains(' ') {
            return None;
        }
        let suggestions = Suggestions::for_last_word(command, self.commands.iter().cloned());
        (!suggestions.matches.is_empty()).then_some(suggestions)
    }
}
