//! Prompt templates and chat-completions wire types for the AI collaborator.

pub mod enrich;

use indoc::formatdoc;
use serde::{Deserialize, Serialize};

use crate::email::Email;

/// Deterministic categorization run.
pub const CATEGORIZE_TEMPERATURE: f64 = 0.0;
/// Reply suggestions get some creative latitude.
pub const REPLY_TEMPERATURE: f64 = 0.7;

pub const CATEGORIZE_SYSTEM_PROMPT: &str = "You are an email assistant. \
    Categorize incoming emails into one of these: Interested, Meeting Booked, \
    Not Interested, Spam, Out of Office, Other. \
    Respond with the category name only.";

pub const REPLY_SYSTEM_PROMPT: &str =
    "You are an email assistant. Suggest a polite, concise reply for this email.";

pub fn categorize_user_prompt(email: &Email) -> String {
    formatdoc! {"
        Categorize this email:
        Subject: {subject}
        Body: {body}",
        subject = email.subject,
        body = email.body,
    }
}

pub fn reply_user_prompt(email: &Email) -> String {
    formatdoc! {"
        Email details:
        From: {from}
        Subject: {subject}
        Body: {body}",
        from = email.from,
        subject = email.subject,
        body = email.body,
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiError {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error(ChatApiError),
}

/// First choice's trimmed content, if the response carries one.
pub fn first_answer(response: &ChatApiResponse) -> Option<String> {
    response
        .choices
        .first()
        .map(|c| c.message.content.trim().to_string())
        .filter(|s| !s.is_empty())
}
