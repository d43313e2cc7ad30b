use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

use crate::error::{Result, DeskError};

static TIMESTAMP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2},\d{3}$").expect("timestamp pattern"));

static SPEAKER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]$").expect("speaker pattern"));

/// One timed speaker utterance, in the server's JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtitle {
    pub id: i64,
    pub start: String,
    pub end: String,
    pub text: String,
    pub speaker: String,
    #[serde(default)]
    pub modified: bool,
}

/// The editable fields of a [`Subtitle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubtitleField {
    Start,
    End,
    Text,
    Speaker,
}

impl SubtitleField {
    pub const ALL: [SubtitleField; 4] = [Self::Start, Self::End, Self::Text, Self::Speaker];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Text => "text",
            Self::Speaker => "speaker",
        }
    }

    /// Check a candidate value against this field's format rule.
    pub fn validate(&self, value: &str) -> bool {
        match self {
            Self::Start | Self::End => TIMESTAMP_PATTERN.is_match(value),
            Self::Text => !value.trim().is_empty(),
            Self::Speaker => SPEAKER_PATTERN.is_match(value),
        }
    }
}

impl fmt::Display for SubtitleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubtitleField {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "end" => Ok(Self::End),
            "text" => Ok(Self::Text),
            "speaker" => Ok(Self::Speaker),
            _ => Err(DeskError::Config(format!(
                "Invalid subtitle field '{}'. Valid fields: start, end, text, speaker",
                s
            ))),
        }
    }
}

impl Subtitle {
    pub fn field(&self, field: SubtitleField) -> &str {
        match field {
            SubtitleField::Start => &self.start,
            SubtitleField::End => &self.end,
            SubtitleField::Text => &self.text,
            SubtitleField::Speaker => &self.speaker,
        }
    }

    /// Replace a field value and mark the entry as edited.
    pub fn set_field(&mut self, field: SubtitleField, value: String) {
        match field {
            SubtitleField::Start => self.start = value,
            SubtitleField::End => self.end = value,
            SubtitleField::Text => self.text = value,
            SubtitleField::Speaker => self.speaker = value,
        }
        self.modified = true;
    }

    pub fn invalid_fields(&self) -> Vec<SubtitleField> {
        SubtitleField::ALL
            .into_iter()
            .filter(|field| !field.validate(self.field(*field)))
            .collect()
    }
}

/// Fields currently flagged invalid, keyed by entry index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    entries: BTreeMap<usize, BTreeSet<SubtitleField>>,
}

impl FieldErrors {
    pub fn set(&mut self, index: usize, field: SubtitleField, invalid: bool) {
        if invalid {
            self.entries.entry(index).or_default().insert(field);
        } else if let Some(fields) = self.entries.get_mut(&index) {
            fields.remove(&field);
            if fields.is_empty() {
                self.entries.remove(&index);
            }
        }
    }

    pub fn is_invalid(&self, index: usize, field: SubtitleField) -> bool {
        self.entries
            .get(&index)
            .is_some_and(|fields| fields.contains(&field))
    }

    pub fn fields_for(&self, index: usize) -> Vec<SubtitleField> {
        self.entries
            .get(&index)
            .map(|fields| fields.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }
}

/// Render subtitles as SRT text
pub fn render_srt(subtitles: &[Subtitle]) -> String {
    let mut srt_content = String::new();

    for (index, subtitle) in subtitles.iter().enumerate() {
        srt_content.push_str(&format!(
            "{}\n{} --> {}\n[{}] {}\n\n",
            index + 1,
            subtitle.start,
            subtitle.end,
            subtitle.speaker,
            subtitle.text.trim()
        ));
    }

    srt_content
}

/// Write subtitles to an SRT file
pub async fn generate_srt<P: AsRef<Path>>(subtitles: &[Subtitle], output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    info!("Generating SRT file: {}", output_path.display());

    fs::write(output_path, render_srt(subtitles)).await?;

    info!("SRT file generated with {} entries", subtitles.len());
    Ok(())
}
