//! Encoder and decoder for the router's bracketed command format.
//!
//! # Wire format
//! Every command starts with a header line
//! `[<module>#<a0>,..,<a5>#<b0>,..,<b5>]<seq>,<count>` followed by `count`
//! field lines. Query fields are bare names, mutate fields are `name=value`.
//! Lines end with CRLF and commands are concatenated without separators.
//! Responses reuse the same header/value-line shape and end with a status
//! line `[error]<code>`.
//!
//! # Design
//! Decoding is a tolerant line scan anchored on two shapes: the section
//! header and the status line. Surrounding whitespace, stray lines between
//! sections and section reordering are accepted. Decoding fails when the
//! status anchor is missing, when a header promises more value lines than
//! follow it, or when a section header appears after the status line.

use std::fmt::Display;

use tracing::trace;

use crate::error::{ApiError, Result};

pub const LINE_END: &str = "\r\n";

/// Prefix of the trailing status line.
pub const STATUS_MARKER: &str = "[error]";

pub const SELECTOR_LEN: usize = 6;

/// Positional instance address carried twice in every header.
pub type Selector = [u32; SELECTOR_LEN];

/// All-zero selector: "new or unspecified instance".
pub const NO_SELECTOR: Selector = [0; SELECTOR_LEN];

/// Whether a command reads fields or assigns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Query,
    Mutate,
}

/// One unit of work against a named module.
///
/// The sequence index is not stored here; it is the command's position in
/// the [`CommandBatch`] that encodes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub module: String,
    pub instance: Selector,
    pub delete: Selector,
    pub operation: Operation,
    pub fields: Vec<String>,
}

impl Command {
    pub fn query(module: impl Into<String>) -> Self {
        Self::new(module, Operation::Query)
    }

    pub fn mutate(module: impl Into<String>) -> Self {
        Self::new(module, Operation::Mutate)
    }

    fn new(module: impl Into<String>, operation: Operation) -> Self {
        Self {
            module: module.into(),
            instance: NO_SELECTOR,
            delete: NO_SELECTOR,
            operation,
            fields: Vec::new(),
        }
    }

    pub fn instance(mut self, selector: Selector) -> Self {
        self.instance = selector;
        self
    }

    pub fn delete_selector(mut self, selector: Selector) -> Self {
        self.delete = selector;
        self
    }

    /// Append a raw field line. Checked against the operation at encode time.
    pub fn field(mut self, line: impl Into<String>) -> Self {
        self.fields.push(line.into());
        self
    }

    pub fn fields<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Append a `name=value` assignment.
    pub fn set(mut self, name: &str, value: impl Display) -> Self {
        self.fields.push(format!("{name}={value}"));
        self
    }

    /// Check the command against the wire grammar without encoding it.
    pub fn validate(&self) -> Result<()> {
        if self.module.is_empty() {
            return Err(ApiError::MalformedCommand("empty module name".to_string()));
        }
        if self
            .module
            .contains(|c: char| matches!(c, '#' | '[' | ']' | '\r' | '\n'))
        {
            return Err(ApiError::MalformedCommand(format!(
                "module name {:?} contains a reserved character",
                self.module
            )));
        }

        for line in &self.fields {
            if line.contains(['\r', '\n']) {
                return Err(malformed(&self.module, line, "contains a line break"));
            }
            match self.operation {
                Operation::Query => {
                    if line.is_empty() {
                        return Err(malformed(&self.module, line, "is empty"));
                    }
                    if line.contains('=') {
                        return Err(malformed(&self.module, line, "query field contains '='"));
                    }
                }
                Operation::Mutate => {
                    if line.matches('=').count() != 1 {
                        return Err(malformed(
                            &self.module,
                            line,
                            "mutate field needs exactly one '='",
                        ));
                    }
                    if line.starts_with('=') {
                        return Err(malformed(&self.module, line, "has an empty name"));
                    }
                }
            }
        }
        Ok(())
    }

    fn encode_into(&self, index: usize, out: &mut String) {
        out.push('[');
        out.push_str(&self.module);
        out.push('#');
        out.push_str(&join_selector(&self.instance));
        out.push('#');
        out.push_str(&join_selector(&self.delete));
        out.push(']');
        out.push_str(&format!("{index},{}", self.fields.len()));
        out.push_str(LINE_END);
        for line in &self.fields {
            out.push_str(line);
            out.push_str(LINE_END);
        }
    }
}

fn malformed(module: &str, line: &str, reason: &str) -> ApiError {
    ApiError::MalformedCommand(format!("{module}: field {line:?} {reason}"))
}

fn join_selector(selector: &Selector) -> String {
    selector
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Ordered commands sharing one HTTP exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBatch {
    commands: Vec<Command>,
}

impl CommandBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command; its sequence index is its position.
    pub fn with(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn encode(&self) -> Result<String> {
        encode(self)
    }
}

impl From<Command> for CommandBatch {
    fn from(command: Command) -> Self {
        Self {
            commands: vec![command],
        }
    }
}

impl FromIterator<Command> for CommandBatch {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        Self {
            commands: iter.into_iter().collect(),
        }
    }
}

/// Encode a batch into wire text.
///
/// Every command is validated first, so a malformed command anywhere in the
/// batch yields an error and no partial output.
pub fn encode(batch: &CommandBatch) -> Result<String> {
    for command in batch.commands() {
        command.validate()?;
    }
    let mut out = String::new();
    for (index, command) in batch.commands().iter().enumerate() {
        command.encode_into(index, &mut out);
    }
    Ok(out)
}

/// A parsed `[module#instance#delete]index,count` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub module: String,
    pub instance: Selector,
    pub delete: Selector,
    pub index: usize,
    pub count: usize,
}

impl SectionHeader {
    /// Match a header line, ignoring whitespace around every token.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix('[')?;
        let (inside, tail) = rest.split_once(']')?;

        let mut parts = inside.rsplitn(3, '#');
        let delete = parse_selector(parts.next()?)?;
        let instance = parse_selector(parts.next()?)?;
        let module = parts.next()?.trim();
        if module.is_empty() {
            return None;
        }

        let (index, count) = tail.split_once(',')?;
        Some(Self {
            module: module.to_string(),
            instance,
            delete,
            index: index.trim().parse().ok()?,
            count: count.trim().parse().ok()?,
        })
    }
}

fn parse_selector(text: &str) -> Option<Selector> {
    let mut selector = NO_SELECTOR;
    let mut parts = text.split(',');
    for slot in selector.iter_mut() {
        *slot = parts.next()?.trim().parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(selector)
}

/// `Some` when the line is a status line; the inner result carries the code.
fn parse_status(line: &str) -> Option<Result<i64>> {
    let code = line.trim().strip_prefix(STATUS_MARKER)?.trim();
    Some(code.parse().map_err(|_| {
        ApiError::ProtocolViolation(format!("status code {code:?} is not an integer"))
    }))
}

fn is_anchor(line: &str) -> bool {
    SectionHeader::parse(line).is_some() || parse_status(line).is_some()
}

/// Field values returned for one command, in the order the router sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSection {
    pub header: SectionHeader,
    pub values: Vec<String>,
}

impl DecodedSection {
    /// Text after the first `=` of line `i`, or the whole line if it has none.
    pub fn value(&self, i: usize) -> Option<&str> {
        let line = self.values.get(i)?;
        Some(line.split_once('=').map_or(line.as_str(), |(_, value)| value))
    }

    /// Value of the first `name=value` line with the given name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.iter().find_map(|line| {
            let (key, value) = line.split_once('=')?;
            (key.trim() == name).then_some(value)
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of decoding one response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Sections in sequence-index order; commands that address several
    /// instances contribute one section per instance.
    pub sections: Vec<DecodedSection>,
    pub status: i64,
}

impl Decoded {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    /// All sections answering the command at `index`.
    pub fn sections_for(&self, index: usize) -> impl Iterator<Item = &DecodedSection> {
        self.sections
            .iter()
            .filter(move |section| section.header.index == index)
    }

    pub fn first_for(&self, index: usize) -> Option<&DecodedSection> {
        self.sections_for(index).next()
    }
}

/// Decode a raw response body.
///
/// A non-zero status is reported in [`Decoded::status`], not as an error;
/// turning it into [`ApiError::ApplicationError`] is the session's job.
pub fn decode(raw: &str) -> Result<Decoded> {
    let lines: Vec<&str> = raw.lines().collect();

    let (status_at, status) = lines
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, line)| parse_status(line).map(|status| (i, status)))
        .ok_or_else(|| ApiError::ProtocolViolation("missing status marker".to_string()))?;
    let status = status?;

    if let Some(line) = lines[status_at + 1..]
        .iter()
        .find(|line| SectionHeader::parse(line).is_some())
    {
        return Err(ApiError::ProtocolViolation(format!(
            "section {:?} follows the status marker",
            line.trim()
        )));
    }

    let mut sections = Vec::new();
    let mut cursor = 0;
    while cursor < status_at {
        let line = lines[cursor];
        cursor += 1;

        let Some(header) = SectionHeader::parse(line) else {
            if !line.trim().is_empty() {
                trace!(line, "skipping line outside any section");
            }
            continue;
        };

        let available = lines[cursor..status_at]
            .iter()
            .take(header.count)
            .take_while(|line| !is_anchor(line))
            .count();
        if available < header.count {
            return Err(ApiError::ProtocolViolation(format!(
                "section {}#{} declares {} lines but only {available} follow",
                header.module, header.index, header.count
            )));
        }

        let values = lines[cursor..cursor + header.count]
            .iter()
            .map(|line| line.to_string())
            .collect();
        cursor += header.count;
        sections.push(DecodedSection { header, values });
    }

    sections.sort_by_key(|section| section.header.index);
    Ok(Decoded { sections, status })
}

/// Find the instance index the router assigned to a newly created record.
///
/// A creating mutate is echoed as a header with no value lines and a
/// non-zero instance selector. The last such header wins, so list sections
/// earlier in the batch are ignored; the id is the innermost non-zero
/// component of its selector. Updates and deletes echo an all-zero selector
/// and yield `IdNotFound`.
pub fn extract_assigned_id(raw: &str) -> Result<u32> {
    raw.lines()
        .filter_map(SectionHeader::parse)
        .filter(|header| header.count == 0)
        .filter_map(|header| header.instance.iter().rev().copied().find(|&c| c != 0))
        .last()
        .ok_or(ApiError::IdNotFound)
}
