//! Parsing of the lines typed at the prompt.

/// What a line typed at the prompt asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// End the session.
    Exit,
    /// Forget the conversation.
    Clear,
    /// Summarize the conversation and offer to save it.
    Save,
    /// Reload the documents and rebuild the index.
    Update,
    /// Anything else is a message for the assistant.
    Message(String),
}

impl Command {
    /// Parses a line, returning `None` for a blank one.
    ///
    /// Keywords are matched on the whole trimmed line, ignoring case.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let command = match line.to_ascii_lowercase().as_str() {
            "exit" => Command::Exit,
            "clear" => Command::Clear,
            "save" => Command::Save,
            "update" => Command::Update,
            _ => Command::Message(line.to_owned()),
        };
        Some(command)
    }
}

/// Returns `true` for an answer accepting a `[Y/n]` question.
pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    answer.is_empty()
        || answer.eq_ignore_ascii_case("y")
        || answer.eq_ignore_ascii_case("yes")
}
