//! Directive-language parser for `GemStackQueue.txt`.
//!
//! The file is scanned line by line. Only text inside a
//! `GemStackSTART` … `GemStackEND` pair is considered. Inside it:
//!
//! - `PromptBlockSTART` / `PromptBlockEND` open and close a scope holding the
//!   current goal and pending specifications.
//! - `goal "<text>"` sets the scope's goal, `specify "<text>"` queues a
//!   checkpoint for the next prompt, `prompt "<text>"` emits a unit.
//! - Directive content may also use `{{ ... }}`, optionally spanning lines.
//! - Any other non-blank line becomes a passthrough unit.
//!
//! Problems are collected as [`ParseWarning`]s; parsing never fails.

use std::fmt;

use crate::core::types::ExecutionUnit;

pub const OUTER_START: &str = "GemStackSTART";
pub const OUTER_END: &str = "GemStackEND";
pub const BLOCK_START: &str = "PromptBlockSTART";
pub const BLOCK_END: &str = "PromptBlockEND";

const BRACE_OPEN: &str = "{{";
const BRACE_CLOSE: &str = "}}";

/// Recognized directive keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Goal,
    Specify,
    Prompt,
}

impl DirectiveKind {
    const ALL: [Self; 3] = [Self::Goal, Self::Specify, Self::Prompt];

    /// Literal line prefix, including the separating space.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Goal => "goal ",
            Self::Specify => "specify ",
            Self::Prompt => "prompt ",
        }
    }

    pub fn as_str(self) -> &'static str {
        self.prefix().trim_end()
    }
}

/// Where pending specifications were discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPoint {
    PromptBlockStart { line: usize },
    PromptBlockEnd { line: usize },
    OuterBlockEnd { line: usize },
    EndOfFile,
}

impl fmt::Display for FlushPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PromptBlockStart { line } => write!(f, "{BLOCK_START} (line {line})"),
            Self::PromptBlockEnd { line } => write!(f, "{BLOCK_END} (line {line})"),
            Self::OuterBlockEnd { line } => write!(f, "{OUTER_END} (line {line})"),
            Self::EndOfFile => f.write_str("end of file"),
        }
    }
}

/// Non-fatal problem found while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    GoalOverwritten { line: usize },
    UnconsumedSpecifications { count: usize, at: FlushPoint },
    MissingContent { kind: DirectiveKind, line: usize },
    UnterminatedCapture { kind: DirectiveKind, line: usize },
    NestedPromptBlock { line: usize },
    UnmatchedPromptBlockEnd { line: usize },
    RepeatedOuterStart { line: usize },
    MissingOuterEnd,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GoalOverwritten { line } => {
                write!(f, "line {line}: goal overwritten, previous goal discarded")
            }
            Self::UnconsumedSpecifications { count, at } => write!(
                f,
                "{count} specify directive(s) without a following prompt discarded at {at}"
            ),
            Self::MissingContent { kind, line } => write!(
                f,
                "line {line}: {} directive has no content (use \"...\" or {{{{ ... }}}})",
                kind.as_str()
            ),
            Self::UnterminatedCapture { kind, line } => write!(
                f,
                "line {line}: {} content opened with {{{{ was never closed, discarded",
                kind.as_str()
            ),
            Self::NestedPromptBlock { line } => write!(
                f,
                "line {line}: {BLOCK_START} inside an open block, previous block closed"
            ),
            Self::UnmatchedPromptBlockEnd { line } => {
                write!(f, "line {line}: {BLOCK_END} without {BLOCK_START}, ignored")
            }
            Self::RepeatedOuterStart { line } => {
                write!(f, "line {line}: {OUTER_START} while already inside, ignored")
            }
            Self::MissingOuterEnd => write!(f, "{OUTER_START} without {OUTER_END}"),
        }
    }
}

/// Units produced from a directive file plus any warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    pub units: Vec<ExecutionUnit>,
    pub warnings: Vec<ParseWarning>,
}

impl ParseOutcome {
    pub fn has_units(&self) -> bool {
        !self.units.is_empty()
    }
}

/// Parse the full text of a directive file.
pub fn parse_directives(text: &str) -> ParseOutcome {
    let mut parser = DirectiveParser::default();
    for (idx, line) in text.lines().enumerate() {
        parser.feed_line(idx + 1, line);
    }
    parser.finish()
}

/// Convert one line of interactive input into a unit.
///
/// `prompt "..."` and single-line `prompt {{ ... }}` become prompts, anything
/// else is passed through. Blank input yields `None`.
pub fn interactive_unit(line: &str) -> Option<ExecutionUnit> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(rest) = trimmed.strip_prefix(DirectiveKind::Prompt.prefix())
        && let Content::Complete(text) = extract_content(rest)
        && !text.trim().is_empty()
    {
        return Some(ExecutionUnit::Prompt(text));
    }
    Some(ExecutionUnit::Passthrough(trimmed.to_string()))
}

/// Build the text of a prompt unit from the active scope.
///
/// Sections appear in fixed order: goal, numbered checkpoint, task.
pub fn compose_prompt(goal: Option<&str>, specifications: &[String], task: &str) -> String {
    if goal.is_none() && specifications.is_empty() {
        return task.to_string();
    }

    let mut out = String::new();
    if let Some(goal) = goal {
        out.push_str("GOAL: ");
        out.push_str(goal);
        out.push_str("\n\n");
    }
    if specifications.is_empty() {
        out.push_str("CURRENT TASK: ");
        out.push_str(task);
        return out;
    }

    out.push_str(
        "CHECKPOINT: Before proceeding, verify that each of the following has been completed:\n",
    );
    for (idx, spec) in specifications.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", idx + 1, spec));
    }
    out.push_str("\nAfter verification, proceed with the following task:\n");
    out.push_str(task);
    out
}

#[derive(Debug)]
struct Capture {
    kind: DirectiveKind,
    buffer: String,
    /// Line holding the opening `{{`.
    start_line: usize,
}

#[derive(Debug, Default)]
struct ParserState {
    inside_outer_block: bool,
    inside_prompt_block: bool,
    pending_specifications: Vec<String>,
    current_goal: Option<String>,
    capture: Option<Capture>,
}

enum Content {
    Complete(String),
    /// `{{` without `}}` on the same line; holds the text after `{{`.
    Open(String),
    Missing,
}

/// Incremental line-oriented parser. Use [`parse_directives`] for whole files.
#[derive(Debug, Default)]
pub struct DirectiveParser {
    state: ParserState,
    units: Vec<ExecutionUnit>,
    warnings: Vec<ParseWarning>,
}

impl DirectiveParser {
    /// Feed one line (without its terminator). `line_no` is 1-based.
    pub fn feed_line(&mut self, line_no: usize, line: &str) {
        if self.state.capture.is_some() {
            self.continue_capture(line);
            return;
        }
        if !self.state.inside_outer_block {
            if let Some(pos) = line.find(OUTER_START) {
                self.open_outer();
                self.body_segment(line_no, &line[pos + OUTER_START.len()..]);
            }
            return;
        }
        self.body_segment(line_no, line);
    }

    /// Close any open scope and return the collected units and warnings.
    pub fn finish(mut self) -> ParseOutcome {
        if let Some(capture) = self.state.capture.take() {
            self.warnings.push(ParseWarning::UnterminatedCapture {
                kind: capture.kind,
                line: capture.start_line,
            });
        }
        if self.state.inside_outer_block {
            self.flush_scope(FlushPoint::EndOfFile);
            self.warnings.push(ParseWarning::MissingOuterEnd);
        }
        ParseOutcome {
            units: self.units,
            warnings: self.warnings,
        }
    }

    fn body_segment(&mut self, line_no: usize, text: &str) {
        let mut text = text;
        if let Some(pos) = text.find(OUTER_START) {
            self.warnings
                .push(ParseWarning::RepeatedOuterStart { line: line_no });
            text = &text[pos + OUTER_START.len()..];
        }
        match text.find(OUTER_END) {
            Some(pos) => {
                self.body_line(line_no, &text[..pos]);
                self.close_outer(line_no);
            }
            None => self.body_line(line_no, text),
        }
    }

    fn body_line(&mut self, line_no: usize, raw: &str) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return;
        }
        if trimmed == BLOCK_START {
            self.open_prompt_block(line_no);
            return;
        }
        if trimmed == BLOCK_END {
            self.close_prompt_block(line_no);
            return;
        }
        for kind in DirectiveKind::ALL {
            if let Some(rest) = trimmed.strip_prefix(kind.prefix()) {
                self.directive(line_no, kind, rest);
                return;
            }
        }
        self.units
            .push(ExecutionUnit::Passthrough(trimmed.to_string()));
    }

    fn directive(&mut self, line_no: usize, kind: DirectiveKind, rest: &str) {
        match extract_content(rest) {
            Content::Complete(text) => self.apply(line_no, kind, text),
            Content::Open(partial) => {
                let mut buffer = partial;
                buffer.push('\n');
                self.state.capture = Some(Capture {
                    kind,
                    buffer,
                    start_line: line_no,
                });
            }
            Content::Missing => self
                .warnings
                .push(ParseWarning::MissingContent { kind, line: line_no }),
        }
    }

    fn continue_capture(&mut self, line: &str) {
        let Some(capture) = self.state.capture.as_mut() else {
            return;
        };
        if let Some(pos) = line.find(BRACE_CLOSE) {
            capture.buffer.push_str(&line[..pos]);
            if let Some(done) = self.state.capture.take() {
                self.apply(done.start_line, done.kind, done.buffer.trim().to_string());
            }
        } else {
            capture.buffer.push_str(line);
            capture.buffer.push('\n');
        }
    }

    fn apply(&mut self, line_no: usize, kind: DirectiveKind, content: String) {
        if content.trim().is_empty() {
            self.warnings
                .push(ParseWarning::MissingContent { kind, line: line_no });
            return;
        }
        match kind {
            DirectiveKind::Goal => {
                if self.state.current_goal.is_some() {
                    self.warnings
                        .push(ParseWarning::GoalOverwritten { line: line_no });
                }
                self.state.current_goal = Some(content);
            }
            DirectiveKind::Specify => self.state.pending_specifications.push(content),
            DirectiveKind::Prompt => {
                let specifications = std::mem::take(&mut self.state.pending_specifications);
                let goal = self.state.current_goal.as_deref();
                let unit = if goal.is_none() && specifications.is_empty() {
                    ExecutionUnit::Prompt(content)
                } else {
                    ExecutionUnit::Composed {
                        text: compose_prompt(goal, &specifications, &content),
                        task: content,
                    }
                };
                self.units.push(unit);
            }
        }
    }

    fn open_outer(&mut self) {
        self.state.inside_outer_block = true;
        self.state.inside_prompt_block = false;
        self.state.pending_specifications.clear();
        self.state.current_goal = None;
    }

    fn close_outer(&mut self, line_no: usize) {
        if let Some(capture) = self.state.capture.take() {
            self.warnings.push(ParseWarning::UnterminatedCapture {
                kind: capture.kind,
                line: capture.start_line,
            });
        }
        self.flush_scope(FlushPoint::OuterBlockEnd { line: line_no });
        self.state.inside_prompt_block = false;
        self.state.inside_outer_block = false;
    }

    fn open_prompt_block(&mut self, line_no: usize) {
        if self.state.inside_prompt_block {
            self.warnings
                .push(ParseWarning::NestedPromptBlock { line: line_no });
            self.flush_scope(FlushPoint::PromptBlockEnd { line: line_no });
        } else {
            self.flush_scope(FlushPoint::PromptBlockStart { line: line_no });
        }
        self.state.inside_prompt_block = true;
    }

    fn close_prompt_block(&mut self, line_no: usize) {
        if !self.state.inside_prompt_block {
            self.warnings
                .push(ParseWarning::UnmatchedPromptBlockEnd { line: line_no });
            return;
        }
        self.flush_scope(FlushPoint::PromptBlockEnd { line: line_no });
        self.state.inside_prompt_block = false;
    }

    /// Drop the scope's goal and pending specifications, warning on the latter.
    fn flush_scope(&mut self, at: FlushPoint) {
        if !self.state.pending_specifications.is_empty() {
            self.warnings.push(ParseWarning::UnconsumedSpecifications {
                count: self.state.pending_specifications.len(),
                at,
            });
            self.state.pending_specifications.clear();
        }
        self.state.current_goal = None;
    }
}

/// Extract directive content from the text following the keyword.
///
/// Whichever of `"` or `{{` comes first selects the form. Quoted content runs
/// from the first quote to the last quote on the line.
fn extract_content(rest: &str) -> Content {
    let quote = rest.find('"');
    let brace = rest.find(BRACE_OPEN);
    match (quote, brace) {
        (Some(first), brace) if brace.is_none_or(|b| first < b) => match rest.rfind('"') {
            Some(last) if last > first => Content::Complete(rest[first + 1..last].to_string()),
            _ => Content::Missing,
        },
        (_, Some(open)) => {
            let after = &rest[open + BRACE_OPEN.len()..];
            match after.find(BRACE_CLOSE) {
                Some(close) => Content::Complete(after[..close].trim().to_string()),
                None => Content::Open(after.to_string()),
            }
        }
        _ => Content::Missing,
    }
}
