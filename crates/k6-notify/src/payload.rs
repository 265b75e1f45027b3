//! Slack `chat.postMessage` body, limited to the block kinds the report uses.

use serde::Serialize;

/// Accent bar shown next to the attachment.
pub const ATTACHMENT_COLOR: &str = "#6945FE";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    pub channel: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub color: String,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Block {
    Section {
        text: Markdown,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        fields: Vec<Markdown>,
    },
    Divider,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "mrkdwn")]
pub struct Markdown {
    pub text: String,
}

impl Markdown {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Block {
    pub fn section(text: impl Into<String>) -> Self {
        Block::Section {
            text: Markdown::new(text),
            fields: Vec::new(),
        }
    }

    pub fn section_with_fields(text: impl Into<String>, fields: Vec<Markdown>) -> Self {
        Block::Section {
            text: Markdown::new(text),
            fields,
        }
    }

    /// Markdown text of a section, `None` for dividers.
    pub fn text(&self) -> Option<&str> {
        match self {
            Block::Section { text, .. } => Some(&text.text),
            Block::Divider => None,
        }
    }
}

impl NotificationPayload {
    pub fn new(channel: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            channel: channel.into(),
            attachments: vec![Attachment {
                color: ATTACHMENT_COLOR.to_string(),
                blocks,
            }],
        }
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.attachments.iter().flat_map(|a| a.blocks.iter())
    }
}
