//! Discord webhook message types.
//!
//! See <https://discord.com/developers/docs/resources/webhook#execute-webhook>

use serde::Serialize;

/// Colors of an [Embed]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedColor {
    Red,
    Green,
    Grey,
}

impl EmbedColor {
    /// the rgb value discord expects
    pub const fn value(self) -> u32 {
        match self {
            Self::Red => 0x992D22,
            Self::Green => 0x2ECC71,
            Self::Grey => 0x95A5A6,
        }
    }
}

impl Serialize for EmbedColor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.value())
    }
}

/// body of a webhook execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub content: String,
    pub embeds: Vec<Embed>,
}

impl Message {
    /// message without text content consisting of a single embed
    pub fn with_embed(embed: Embed) -> Self {
        Self {
            content: String::new(),
            embeds: vec![embed],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: EmbedColor,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}
