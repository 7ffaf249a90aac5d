//! Vocabulary entry model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timestamp::{self, Timestamp};

/// Prefix marking a media field that carries its payload inline.
pub const INLINE_MEDIA_PREFIX: &str = "data:";

/// A flashcard in the vocabulary collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Stable identifier, generated by whichever side created the entry
    pub id: String,
    /// Word or phrase being learned
    #[serde(default)]
    pub german: String,
    /// Translation
    #[serde(default)]
    pub english: String,
    /// Part of speech (noun, verb, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_of_speech: Option<String>,
    /// Example sentences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    /// Hosted image URL or inline `data:` payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Hosted audio URL or inline `data:` payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// Free-text notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Creation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    /// Timestamp of the last mutation
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    /// Device that produced the last mutation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl Entry {
    /// Create a new entry with a fresh UUID v7 identifier.
    ///
    /// `updated_at` stays empty until the entry store stamps the mutation.
    #[must_use]
    pub fn new(german: impl Into<String>, english: impl Into<String>) -> Self {
        Self::with_id(Uuid::now_v7().to_string(), german, english)
    }

    /// Create an entry with a caller-chosen identifier.
    #[must_use]
    pub fn with_id(
        id: impl Into<String>,
        german: impl Into<String>,
        english: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            german: german.into(),
            english: english.into(),
            part_of_speech: None,
            examples: Vec::new(),
            image_url: None,
            audio_url: None,
            notes: None,
            created_at: Some(timestamp::now()),
            updated_at: None,
            client_id: None,
        }
    }

    /// Builder-style setter for `updated_at`.
    #[must_use]
    pub fn updated(mut self, at: Timestamp) -> Self {
        self.updated_at = Some(at);
        self
    }

    /// Last mutation time, treating an unstamped entry as older than anything.
    pub fn modified_at(&self) -> Timestamp {
        self.updated_at.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Stamp `updated_at` with `now` when it is missing. Returns whether the
    /// entry changed.
    pub fn stamp_if_missing(&mut self, now: Timestamp) -> bool {
        if self.updated_at.is_some() {
            return false;
        }
        self.updated_at = Some(now);
        true
    }

    /// Strictly newer than `other` by `updated_at`.
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.modified_at() > other.modified_at()
    }

    /// Changed strictly after `since` (always true without a watermark).
    pub fn changed_since(&self, since: Option<Timestamp>) -> bool {
        timestamp::changed_since(self.modified_at(), since)
    }

    /// Whether any media field holds an inline payload.
    pub fn has_inline_media(&self) -> bool {
        is_inline_media(self.image_url.as_deref()) || is_inline_media(self.audio_url.as_deref())
    }

    /// Replace inline media payloads with `None`, keeping hosted URLs.
    /// Returns whether anything was removed.
    pub fn strip_inline_media(&mut self) -> bool {
        let mut stripped = false;
        for field in [&mut self.image_url, &mut self.audio_url] {
            if is_inline_media(field.as_deref()) {
                *field = None;
                stripped = true;
            }
        }
        stripped
    }

    /// Check the fields the sync protocol relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("entry id must not be empty".to_string());
        }
        Ok(())
    }

    /// One-line human readable summary, e.g. `Hund (noun) = dog`.
    #[must_use]
    pub fn summary(&self) -> String {
        let head = self.part_of_speech.as_deref().map_or_else(
            || self.german.trim().to_string(),
            |pos| format!("{} ({pos})", self.german.trim()),
        );
        if self.english.trim().is_empty() {
            head
        } else {
            format!("{head} = {}", self.english.trim())
        }
    }
}

fn is_inline_media(value: Option<&str>) -> bool {
    value.is_some_and(|value| value.trim_start().starts_with(INLINE_MEDIA_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::parse;

    #[test]
    fn test_entry_ids_are_unique() {
        let first = Entry::new("Hund", "dog");
        let second = Entry::new("Katze", "cat");
        assert_ne!(first.id, second.id);
        assert!(first.updated_at.is_none());
        assert!(first.created_at.is_some());
    }

    #[test]
    fn test_deserialize_camel_case_and_defaults() {
        let entry: Entry = serde_json::from_str(
            r#"{"id":"e1","german":"Hund","partOfSpeech":"noun","updatedAt":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(entry.id, "e1");
        assert_eq!(entry.english, "");
        assert_eq!(entry.part_of_speech.as_deref(), Some("noun"));
        assert_eq!(entry.updated_at, parse("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_serialize_keeps_null_updated_at() {
        let entry = Entry::with_id("e1", "Hund", "dog");
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json["updatedAt"].is_null());
        assert!(json.get("imageUrl").is_none());
    }

    #[test]
    fn test_stamp_if_missing_only_fills_gaps() {
        let stamp = parse("2024-01-01T00:00:00Z").unwrap();
        let mut entry = Entry::with_id("e1", "Hund", "dog");
        assert!(entry.stamp_if_missing(stamp));
        assert!(!entry.stamp_if_missing(parse("2025-01-01T00:00:00Z").unwrap()));
        assert_eq!(entry.updated_at, Some(stamp));
    }

    #[test]
    fn test_unstamped_entry_is_older_than_stamped() {
        let unstamped = Entry::with_id("e1", "Hund", "dog");
        let stamped = unstamped
            .clone()
            .updated(parse("1970-01-01T00:00:00Z").unwrap());
        assert!(stamped.is_newer_than(&unstamped));
        assert!(!unstamped.is_newer_than(&stamped));
    }

    #[test]
    fn test_strip_inline_media_keeps_hosted_urls() {
        let mut entry = Entry::with_id("e1", "Hund", "dog");
        entry.image_url = Some("data:image/png;base64,AAAA".to_string());
        entry.audio_url = Some("https://cdn.example.com/hund.mp3".to_string());

        assert!(entry.has_inline_media());
        assert!(entry.strip_inline_media());
        assert_eq!(entry.image_url, None);
        assert_eq!(
            entry.audio_url.as_deref(),
            Some("https://cdn.example.com/hund.mp3")
        );
        assert!(!entry.strip_inline_media());
    }

    #[test]
    fn test_validate_rejects_blank_id() {
        assert!(Entry::with_id("  ", "Hund", "dog").validate().is_err());
        assert!(Entry::with_id("e1", "", "").validate().is_ok());
    }

    #[test]
    fn test_summary() {
        let mut entry = Entry::with_id("e1", "Hund", "dog");
        assert_eq!(entry.summary(), "Hund = dog");
        entry.part_of_speech = Some("noun".to_string());
        assert_eq!(entry.summary(), "Hund (noun) = dog");
    }
}
