//! Comment-tag extraction: `@arch`, `@intent` and multi-line `@override` blocks.
//!
//! A line-oriented state machine rather than one large regex, because an
//! override block spans several comment lines with optional fields:
//!
//! ```text
//! // @arch domain.service
//! // @intent:cached
//! // @override forbid_import:axios
//! // @reason Legacy client, removed in the v3 migration
//! // @expires 2026-06-30
//! // @ticket ARCH-142
//! // @approved_by platform-team
//! ```

use crate::core::codes;
use crate::core::semantic::SemanticModel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchTag {
    pub id: String,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideTag {
    pub rule: String,
    pub value: String,
    pub reason: Option<String>,
    pub expires: Option<String>,
    pub ticket: Option<String>,
    pub approved_by: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IntentScope {
    File,
    /// Function-level; the name is bound from the semantic model.
    Function(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentAnnotation {
    pub name: String,
    pub line: usize,
    pub scope: IntentScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagError {
    pub code: &'static str,
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedTags {
    pub arch: Option<ArchTag>,
    pub overrides: Vec<OverrideTag>,
    pub intents: Vec<IntentAnnotation>,
    pub errors: Vec<TagError>,
}

impl ExtractedTags {
    pub fn arch_id(&self) -> Option<&str> {
        self.arch.as_ref().map(|a| a.id.as_str())
    }

    pub fn file_intents(&self) -> impl Iterator<Item = &IntentAnnotation> {
        self.intents.iter().filter(|i| i.scope == IntentScope::File)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    OutsideComment,
    InHeaderComment,
    InOverrideBlock,
}

enum LineKind<'a> {
    Blank,
    Code,
    Comment(&'a str),
}

struct Scanner {
    state: ScanState,
    seen_code: bool,
    in_block_comment: bool,
    pending: Option<OverrideTag>,
    out: ExtractedTags,
}

pub fn extract_tags(content: &str) -> ExtractedTags {
    let mut scanner = Scanner {
        state: ScanState::OutsideComment,
        seen_code: false,
        in_block_comment: false,
        pending: None,
        out: ExtractedTags::default(),
    };
    for (idx, line) in content.lines().enumerate() {
        scanner.step(idx + 1, line);
    }
    scanner.finish_override();
    scanner.out
}

impl Scanner {
    fn step(&mut self, line_no: usize, line: &str) {
        match classify(line, &mut self.in_block_comment) {
            LineKind::Code => {
                self.finish_override();
                self.seen_code = true;
                self.state = ScanState::OutsideComment;
            }
            LineKind::Blank => {
                if self.state == ScanState::InOverrideBlock {
                    self.finish_override();
                }
            }
            LineKind::Comment(text) => {
                if self.state == ScanState::InOverrideBlock {
                    if self.override_field(line_no, text) {
                        return;
                    }
                    self.finish_override();
                }
                if self.state == ScanState::OutsideComment && !self.seen_code {
                    self.state = ScanState::InHeaderComment;
                }
                self.comment(line_no, text);
            }
        }
    }

    fn resting_state(&self) -> ScanState {
        if self.seen_code {
            ScanState::OutsideComment
        } else {
            ScanState::InHeaderComment
        }
    }

    fn finish_override(&mut self) {
        if let Some(tag) = self.pending.take() {
            self.out.overrides.push(tag);
        }
        if self.state == ScanState::InOverrideBlock {
            self.state = self.resting_state();
        }
    }

    /// Returns false when the line is not an override field.
    fn override_field(&mut self, line_no: usize, text: &str) -> bool {
        let Some((tag, rest)) = split_tag(text) else {
            return false;
        };
        let Some(pending) = self.pending.as_mut() else {
            return false;
        };
        let slot = match tag {
            "reason" => &mut pending.reason,
            "expires" => &mut pending.expires,
            "ticket" => &mut pending.ticket,
            "approved_by" | "approved-by" | "approvedBy" => &mut pending.approved_by,
            _ => return false,
        };
        if rest.is_empty() {
            self.out.errors.push(TagError {
                code: codes::O001_INVALID_SYNTAX,
                line: line_no,
                message: format!("@{} has no value", tag),
            });
        } else {
            *slot = Some(rest.to_string());
        }
        true
    }

    fn comment(&mut self, line_no: usize, text: &str) {
        let mut remaining = text;
        while let Some(start) = remaining.find('@') {
            let Some((tag, rest)) = split_tag(&remaining[start..]) else {
                break;
            };
            remaining = match tag {
                "arch" => self.arch_tag(line_no, rest),
                "override" => {
                    self.override_tag(line_no, rest);
                    ""
                }
                "reason" | "expires" | "ticket" | "approved_by" | "approved-by" | "approvedBy" => {
                    self.out.errors.push(TagError {
                        code: codes::O001_INVALID_SYNTAX,
                        line: line_no,
                        message: format!("@{} without a preceding @override", tag),
                    });
                    ""
                }
                "intent" => self.intent_tag(line_no, None, rest),
                other => match other.strip_prefix("intent:") {
                    Some(name) => self.intent_tag(line_no, Some(name), rest),
                    None => rest,
                },
            };
        }
    }

    fn arch_tag<'a>(&mut self, line_no: usize, rest: &'a str) -> &'a str {
        let (id, tail) = first_token(rest);
        if id.is_empty() {
            self.out.errors.push(TagError {
                code: codes::S001_PARSE_ERROR,
                line: line_no,
                message: "@arch has no architecture id".to_string(),
            });
            return tail;
        }
        match &self.out.arch {
            Some(existing) => self.out.errors.push(TagError {
                code: codes::S001_PARSE_ERROR,
                line: line_no,
                message: format!(
                    "duplicate @arch '{}' ignored; '{}' declared on line {}",
                    id, existing.id, existing.line
                ),
            }),
            None => {
                self.out.arch = Some(ArchTag {
                    id: id.to_string(),
                    line: line_no,
                })
            }
        }
        tail
    }

    fn intent_tag<'a>(&mut self, line_no: usize, inline: Option<&'a str>, rest: &'a str) -> &'a str {
        let (name, tail) = match inline {
            Some(name) => (name, rest),
            None => first_token(rest),
        };
        if name.is_empty() {
            return tail;
        }
        let scope = if self.seen_code {
            IntentScope::Function(None)
        } else {
            IntentScope::File
        };
        self.out.intents.push(IntentAnnotation {
            name: name.to_string(),
            line: line_no,
            scope,
        });
        tail
    }

    fn override_tag(&mut self, line_no: usize, rest: &str) {
        self.finish_override();
        let parsed = rest
            .split_once(':')
            .map(|(rule, value)| (rule.trim(), value.trim()))
            .filter(|(rule, value)| !rule.is_empty() && !value.is_empty());
        match parsed {
            Some((rule, value)) => {
                self.pending = Some(OverrideTag {
                    rule: rule.to_string(),
                    value: value.to_string(),
                    line: line_no,
                    ..OverrideTag::default()
                });
                self.state = ScanState::InOverrideBlock;
            }
            None => self.out.errors.push(TagError {
                code: codes::O001_INVALID_SYNTAX,
                line: line_no,
                message: format!("expected '@override <rule>:<value>', found '@override {}'", rest),
            }),
        }
    }
}

fn classify<'a>(line: &'a str, in_block: &mut bool) -> LineKind<'a> {
    let t = line.trim();
    if *in_block {
        let body = match t.find("*/") {
            Some(end) => {
                *in_block = false;
                &t[..end]
            }
            None => t,
        };
        return LineKind::Comment(body.trim_start_matches('*').trim());
    }
    if t.is_empty() {
        return LineKind::Blank;
    }
    if let Some(rest) = t.strip_prefix("//") {
        return LineKind::Comment(rest.trim_start_matches('/').trim());
    }
    if let Some(rest) = t.strip_prefix("/*") {
        let rest = rest.trim_start_matches('*');
        return match rest.find("*/") {
            Some(end) => LineKind::Comment(rest[..end].trim()),
            None => {
                *in_block = true;
                LineKind::Comment(rest.trim())
            }
        };
    }
    if t.starts_with('#') && !t.starts_with("#[") {
        return LineKind::Comment(t.trim_start_matches('#').trim());
    }
    if let Some(rest) = t.strip_prefix("--") {
        return LineKind::Comment(rest.trim());
    }
    LineKind::Code
}

/// `@name rest...` -> `("name", "rest...")`.
fn split_tag(text: &str) -> Option<(&str, &str)> {
    let body = text.trim_start().strip_prefix('@')?;
    let end = body.find(char::is_whitespace).unwrap_or(body.len());
    let tag = &body[..end];
    if tag.is_empty() {
        return None;
    }
    Some((tag, body[end..].trim()))
}

fn first_token(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    (&text[..end], text[end..].trim_start())
}

/// Binds each function-level intent to the first function declared after it.
pub fn bind_function_intents(intents: &mut [IntentAnnotation], model: &SemanticModel) {
    for intent in intents.iter_mut() {
        if let IntentScope::Function(None) = intent.scope {
            let target = model
                .functions
                .iter()
                .filter(|f| f.start_line > intent.line)
                .min_by_key(|f| f.start_line)
                .or_else(|| model.function_at(intent.line));
            intent.scope = IntentScope::Function(target.map(|f| f.name.clone()));
        }
    }
}
