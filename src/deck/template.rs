// src/deck/template.rs
// Tagged-variant card-content parsing. Each template kind maps a card's
// positional fields to a normalized shape the renderer consumes uniformly.

use serde::{Deserialize, Serialize};

use crate::error::{MemodeckError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateKind {
    /// Front / back.
    Basic,
    /// Multiple choice: question, newline-separated options, answer key,
    /// optional explanation.
    Choice,
    /// Type-the-answer: word plus a hint shown up front.
    Spelling,
}

impl TemplateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateKind::Basic => "basic",
            TemplateKind::Choice => "choice",
            TemplateKind::Spelling => "spelling",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "basic" => Ok(TemplateKind::Basic),
            "choice" => Ok(TemplateKind::Choice),
            "spelling" => Ok(TemplateKind::Spelling),
            other => Err(MemodeckError::UnknownTemplateKind(other.to_string())),
        }
    }
}

/// Normalized card content, ready for a renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum CardContent {
    Basic {
        front: String,
        back: String,
    },
    Choice {
        question: String,
        options: Vec<String>,
        answer: String,
        explanation: Option<String>,
    },
    Spelling {
        word: String,
        hint: String,
    },
}

/// Maps positional fields to content. Missing trailing fields degrade to
/// empty values rather than failing; a half-filled card should still show.
pub fn parse_content(kind: TemplateKind, fields: &[String]) -> CardContent {
    let field = |i: usize| fields.get(i).cloned().unwrap_or_default();
    match kind {
        TemplateKind::Basic => CardContent::Basic {
            front: field(0),
            back: field(1),
        },
        TemplateKind::Choice => CardContent::Choice {
            question: field(0),
            options: field(1)
                .lines()
                .map(str::to_string)
                .filter(|l| !l.is_empty())
                .collect(),
            answer: field(2),
            explanation: fields.get(3).filter(|s| !s.is_empty()).cloned(),
        },
        TemplateKind::Spelling => CardContent::Spelling {
            word: field(0),
            hint: field(1),
        },
    }
}
