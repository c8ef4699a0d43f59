//! Standup submissions and their IRC rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::paths;
use crate::types::StatusCategory;

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub member: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub in_progress: Vec<String>,
    #[serde(default)]
    pub impediments: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

impl Submission {
    /// Build a submission from raw multi-line form fields. Each field is split
    /// on newlines and blank lines are dropped.
    pub fn from_text(
        member: &str,
        area: Option<&str>,
        completed: &str,
        in_progress: &str,
        impediments: &str,
    ) -> Result<Self> {
        let member = member.trim();
        paths::validate_member(member)?;
        Ok(Self {
            member: member.to_string(),
            area: area
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
            completed: split_lines(completed),
            in_progress: split_lines(in_progress),
            impediments: split_lines(impediments),
            submitted_at: Utc::now(),
        })
    }

    pub fn lines(&self, category: StatusCategory) -> &[String] {
        match category {
            StatusCategory::Completed => &self.completed,
            StatusCategory::InProgress => &self.in_progress,
            StatusCategory::Impediments => &self.impediments,
        }
    }

    pub fn has(&self, category: StatusCategory) -> bool {
        !self.lines(category).is_empty()
    }

    /// Render the message relayed to IRC and stored as the presence marker.
    ///
    /// The first line names the member (and area). Every status line is
    /// prefixed with its category label and wrapped at `width` bytes;
    /// continuation lines repeat the label so each IRC line stands alone.
    pub fn render(&self, width: usize) -> String {
        let header = match &self.area {
            Some(area) => format!("{} ({area})", self.member),
            None => self.member.clone(),
        };
        let mut out = vec![truncate_line(&header, width)];
        for &category in StatusCategory::all() {
            for line in self.lines(category) {
                out.extend(wrap_labeled(category.label(), line, width));
            }
        }
        out.join("\n")
    }
}

// ---------------------------------------------------------------------------
// Line helpers
// ---------------------------------------------------------------------------

/// Split user input into non-blank lines with trailing whitespace removed.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Cut `line` to at most `width` bytes, marking the cut with `...`.
pub fn truncate_line(line: &str, width: usize) -> String {
    if line.len() <= width {
        return line.to_string();
    }
    let cut = floor_char_boundary(line, width.saturating_sub(3));
    format!("{}...", &line[..cut])
}

/// Wrap `text` into lines of at most `width` bytes, each starting with
/// `"{label}: "`. Breaks on whitespace; words longer than a line are split
/// on a char boundary.
pub fn wrap_labeled(label: &str, text: &str, width: usize) -> Vec<String> {
    let prefix = format!("{label}: ");
    // room for at least one UTF-8 char, or a split could never progress
    let room = width.saturating_sub(prefix.len()).max(4);

    let mut lines = Vec::new();
    let mut current = String::new();

    for mut word in text.split_whitespace() {
        loop {
            let sep = usize::from(!current.is_empty());
            if current.len() + sep + word.len() <= room {
                if sep == 1 {
                    current.push(' ');
                }
                current.push_str(word);
                break;
            }
            if !current.is_empty() {
                lines.push(format!("{prefix}{current}"));
                current.clear();
                continue;
            }
            let cut = floor_char_boundary(word, room);
            lines.push(format!("{prefix}{}", &word[..cut]));
            word = &word[cut..];
            if word.is_empty() {
                break;
            }
        }
    }
    if !current.is_empty() {
        lines.push(format!("{prefix}{current}"));
    }
    lines
}

/// Largest char boundary in `s` at or below `max`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut i = max;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
