//! Terminal prompts.

use console::{style, Term};
use mmpm_platform::Prompter;

/// Asks questions on the controlling terminal.
pub struct TermPrompter {
    term: Term,
}

impl TermPrompter {
    pub fn new() -> Self {
        Self { term: Term::stderr() }
    }

    fn read_answer(&self, question: &str) -> Option<String> {
        self.term.write_str(question).ok()?;
        self.term.read_line().ok()
    }
}

impl Prompter for TermPrompter {
    fn confirm(&self, question: &str) -> bool {
        let question = format!("{} {} ", question, style("[yes/y, no/n]:").dim());

        loop {
            // EOF or a closed terminal answers no
            let Some(answer) = self.read_answer(&question) else {
                return false;
            };

            match parse_confirmation(&answer) {
                Some(answer) => return answer,
                None => {
                    let _ = self.term.write_line("Respond with yes/no or y/n.");
                }
            }
        }
    }

    fn ask(&self, question: &str) -> Option<String> {
        self.read_answer(question).map(|a| a.trim().to_string())
    }
}

fn parse_confirmation(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "yes" | "y" => Some(true),
        "no" | "n" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_confirmation() {
        assert_eq!(parse_confirmation(" Y\n"), Some(true));
        assert_eq!(parse_confirmation("yes"), Some(true));
        assert_eq!(parse_confirmation("N"), Some(false));
        assert_eq!(parse_confirmation("maybe"), None);
        assert_eq!(parse_confirmation(""), None);
    }
}
