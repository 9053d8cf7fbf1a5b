use std::io;

/// Interactive console used to resolve an overwrite conflict.
pub trait Prompter {
    fn prompt_line(&self, prompt: &str) -> io::Result<String>;

    fn confirm(&self, prompt: &str) -> io::Result<bool> {
        self.prompt_line(prompt).map(|answer| parse_consent(&answer))
    }
}

/// Only an explicit "y" or "yes" counts as consent.
pub fn parse_consent(answer: &str) -> bool {
    matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    )
}
