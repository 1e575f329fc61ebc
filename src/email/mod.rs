use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

pub const DEFAULT_SUBJECT: &str = "No Subject";
pub const DEFAULT_BODY: &str = "No content provided";
pub const DEFAULT_FOLDER: &str = "INBOX";
pub const DEFAULT_REPLY: &str = "No suggested reply available.";

/// The fixed classification vocabulary. Anything the model returns outside of
/// this set collapses to `Other`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum Category {
    Interested,
    #[serde(rename = "Meeting Booked")]
    #[strum(serialize = "Meeting Booked")]
    MeetingBooked,
    #[serde(rename = "Not Interested")]
    #[strum(serialize = "Not Interested")]
    NotInterested,
    Spam,
    #[serde(rename = "Out of Office")]
    #[strum(serialize = "Out of Office")]
    OutOfOffice,
    Other,
}

impl Default for Category {
    fn default() -> Self {
        Category::Other
    }
}

impl Category {
    /// Maps a model answer onto the vocabulary. Tries an exact match first,
    /// then looks for a category name embedded in a longer answer. The
    /// longest matching name wins, so "Not Interested" never collapses to
    /// `Interested`.
    pub fn parse_lenient(answer: &str) -> Category {
        let trimmed = answer.trim().trim_end_matches(['.', '"']).trim_start_matches('"');
        if let Ok(category) = trimmed.parse::<Category>() {
            return category;
        }
        Category::iter()
            .filter(|c| answer.contains(&c.to_string()))
            .max_by_key(|c| c.to_string().len())
            .unwrap_or(Category::Other)
    }
}

/// A message as it arrives from a mailbox fetch or a direct API submission,
/// before any defaults are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEmail {
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub folder: Option<String>,
    pub account: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// The canonical, normalized email record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub folder: String,
    pub account: String,
    pub date: DateTime<Utc>,
}

impl Email {
    /// Pure mapping from a raw message: fill subject/body defaults, stamp
    /// folder/account/date. Malformed input maps to defaults, never errors.
    pub fn normalize(raw: RawEmail) -> Email {
        let non_empty = |v: Option<String>, default: &str| {
            v.filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Email {
            from: raw.from.unwrap_or_default(),
            to: raw.to.unwrap_or_default(),
            subject: non_empty(raw.subject, DEFAULT_SUBJECT),
            body: non_empty(raw.body, DEFAULT_BODY),
            folder: non_empty(raw.folder, DEFAULT_FOLDER),
            account: raw.account.unwrap_or_default(),
            date: raw.date.unwrap_or_else(Utc::now),
        }
    }
}

/// The enriched form persisted in the search store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailDocument {
    #[serde(flatten)]
    pub email: Email,
    pub category: Category,
    #[serde(rename = "suggestedReply")]
    pub suggested_reply: String,
}

impl EmailDocument {
    /// True when the document lacks valid enrichment and should be picked up
    /// by the reprocessing job. Note this cannot distinguish "genuinely Other"
    /// from "never classified"; legitimately-Other documents match every run.
    pub fn needs_enrichment(&self) -> bool {
        self.category == Category::Other
            || self.suggested_reply.is_empty()
            || self.suggested_reply == DEFAULT_REPLY
    }
}
