//! Yes/no and free-text questions for the user.

/// Asks the user questions.
pub trait Prompter: Send + Sync {
    /// Ask a yes/no question.
    fn confirm(&self, question: &str) -> bool;

    /// Ask for a line of text. `None` when no answer can be read.
    fn ask(&self, question: &str) -> Option<String>;
}

/// Answers yes to every question and never supplies text.
///
/// Used by `--yes` and by the HTTP API, where nobody is there to answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Prompter for AssumeYes {
    fn confirm(&self, _question: &str) -> bool {
        true
    }

    fn ask(&self, _question: &str) -> Option<String> {
        None
    }
}
