//! Scripted stand-ins for [`ProcessRunner`] and [`Prompter`].

use crate::{CommandSpec, PlatformError, ProcessOutput, ProcessRunner, Prompter};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;

type Effect = Box<dyn Fn(&CommandSpec) + Send + Sync>;

struct Rule {
    program: String,
    first_arg: Option<String>,
    output: ProcessOutput,
    effect: Option<Effect>,
}

impl Rule {
    fn matches(&self, spec: &CommandSpec) -> bool {
        self.program == spec.program
            && self
                .first_arg
                .as_ref()
                .map_or(true, |arg| spec.args.first() == Some(arg))
    }
}

/// Records every command and answers from a list of rules.
///
/// Rules match on program name and, optionally, the first argument. The most
/// recently added matching rule wins. Unmatched commands succeed with empty
/// output. An effect can mutate the filesystem to mimic the real tool, e.g.
/// create the directory a `git clone` would have produced.
#[derive(Default)]
pub struct RecordingRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to `program [first_arg ...]` with `output`.
    pub fn on(&self, program: &str, first_arg: Option<&str>, output: ProcessOutput) -> &Self {
        self.push(program, first_arg, output, None)
    }

    /// Like [`on`](Self::on), also running `effect` before answering.
    pub fn on_with<F>(
        &self,
        program: &str,
        first_arg: Option<&str>,
        output: ProcessOutput,
        effect: F,
    ) -> &Self
    where
        F: Fn(&CommandSpec) + Send + Sync + 'static,
    {
        self.push(program, first_arg, output, Some(Box::new(effect)))
    }

    fn push(
        &self,
        program: &str,
        first_arg: Option<&str>,
        output: ProcessOutput,
        effect: Option<Effect>,
    ) -> &Self {
        self.rules.lock().push(Rule {
            program: program.to_string(),
            first_arg: first_arg.map(str::to_string),
            output,
            effect,
        });
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Recorded commands as display strings.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls.lock().iter().map(CommandSpec::display).collect()
    }

    /// Working directories of the recorded commands.
    pub fn cwds(&self) -> Vec<Option<PathBuf>> {
        self.calls.lock().iter().map(|c| c.cwd.clone()).collect()
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, PlatformError> {
        self.calls.lock().push(spec.clone());

        let rules = self.rules.lock();
        match rules.iter().rev().find(|rule| rule.matches(spec)) {
            Some(rule) => {
                if let Some(effect) = &rule.effect {
                    effect(spec);
                }
                Ok(rule.output.clone())
            }
            None => Ok(ProcessOutput::default()),
        }
    }
}

/// Answers questions from queues, recording each question asked.
#[derive(Default)]
pub struct ScriptedPrompter {
    confirms: Mutex<VecDeque<bool>>,
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
    /// Answer once the confirm queue is exhausted.
    pub default_confirm: bool,
}

impl ScriptedPrompter {
    /// Confirms everything and has no text answers.
    pub fn yes() -> Self {
        Self {
            default_confirm: true,
            ..Self::default()
        }
    }

    /// Declines everything.
    pub fn no() -> Self {
        Self::default()
    }

    pub fn with_confirms(self, confirms: impl IntoIterator<Item = bool>) -> Self {
        self.confirms.lock().extend(confirms);
        self
    }

    pub fn with_answers<I, S>(self, answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.answers.lock().extend(answers.into_iter().map(Into::into));
        self
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, question: &str) -> bool {
        self.asked.lock().push(question.to_string());
        self.confirms.lock().pop_front().unwrap_or(self.default_confirm)
    }

    fn ask(&self, question: &str) -> Option<String> {
        self.asked.lock().push(question.to_string());
        self.answers.lock().pop_front()
    }
}
