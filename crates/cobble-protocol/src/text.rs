//! Chat text components.
//!
//! The login stage carries text as a JSON string; configuration and play
//! carry the same structure as a tag tree. [`Text`] is the common model
//! and knows how to render itself both ways.

use serde::{Deserialize, Serialize};

use crate::codec::{Decode, Encode, Reader, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::nbt::{Compound, List, Tag};
use crate::types::{read_string, write_string};

/// Longest JSON text the protocol accepts.
pub const MAX_JSON_TEXT: usize = 262_144;

/// A text component.
///
/// Only the parts the server produces itself are modelled: literal text,
/// translation keys with arguments, a colour, and children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translate: Option<String>,
    #[serde(default, rename = "with", skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Text>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<Text>,
}

impl Text {
    /// Literal text.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A client-side translation key with arguments.
    pub fn translate(key: impl Into<String>, args: Vec<Text>) -> Self {
        Self {
            translate: Some(key.into()),
            args,
            ..Self::default()
        }
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn append(mut self, child: Text) -> Self {
        self.extra.push(child);
        self
    }

    /// Flattens the component into the text a player would read, with
    /// translation keys left as-is.
    pub fn to_plain(&self) -> String {
        let mut out = String::new();
        self.collect_plain(&mut out);
        out
    }

    fn collect_plain(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        if let Some(key) = &self.translate {
            out.push_str(key);
        }
        for child in &self.extra {
            child.collect_plain(out);
        }
    }

    /// Renders the JSON form used during login.
    pub fn to_json(&self) -> String {
        // Serializing a struct of strings and vectors cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{\"text\":\"\"}"))
    }

    /// Renders the tag-tree form used in configuration and play.
    pub fn to_tag(&self) -> Tag {
        let mut compound = Compound::new();
        match (&self.text, &self.translate) {
            (_, Some(key)) => compound.insert("translate", key.as_str()),
            (Some(text), None) => compound.insert("text", text.as_str()),
            (None, None) => compound.insert("text", ""),
        }
        if !self.args.is_empty() {
            compound.insert("with", list_of(&self.args));
        }
        if let Some(color) = &self.color {
            compound.insert("color", color.as_str());
        }
        if !self.extra.is_empty() {
            compound.insert("extra", list_of(&self.extra));
        }
        Tag::Compound(compound)
    }

    /// Reads the tag-tree form. A bare string tag is plain text.
    pub fn from_tag(tag: &Tag) -> Result<Self, DecodeError> {
        match tag {
            Tag::String(text) => Ok(Self::plain(text.clone())),
            Tag::Compound(compound) => {
                let string = |key: &str| compound.get(key).and_then(Tag::as_str).map(str::to_owned);
                let children = |key: &str| -> Result<Vec<Text>, DecodeError> {
                    match compound.get(key) {
                        Some(Tag::List(list)) => list.items().iter().map(Text::from_tag).collect(),
                        _ => Ok(Vec::new()),
                    }
                };
                Ok(Self {
                    text: string("text"),
                    translate: string("translate"),
                    args: children("with")?,
                    color: string("color"),
                    extra: children("extra")?,
                })
            }
            _ => Err(DecodeError::UnknownDiscriminant {
                ty: "text component",
                value: 0,
            }),
        }
    }
}

fn list_of(items: &[Text]) -> List {
    // Every element is a compound, so the list is homogeneous.
    List::new(items.iter().map(Text::to_tag).collect()).unwrap_or_else(|_| List::empty())
}

impl From<&str> for Text {
    fn from(value: &str) -> Self {
        Text::plain(value)
    }
}

impl From<String> for Text {
    fn from(value: String) -> Self {
        Text::plain(value)
    }
}

/// Configuration and play stages: the tag-tree form.
impl Encode for Text {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        self.to_tag().encode(w)
    }
}

impl Decode for Text {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Text::from_tag(&Tag::decode(r)?)
    }
}

/// Login stage: the JSON form, carried as a bounded string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonText(pub Text);

impl Encode for JsonText {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        write_string(w, &self.0.to_json(), MAX_JSON_TEXT)
    }
}

impl Decode for JsonText {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let raw = read_string(r, MAX_JSON_TEXT)?;
        // Vanilla also accepts a bare JSON string as plain text.
        if let Ok(text) = serde_json::from_str::<Text>(&raw) {
            return Ok(Self(text));
        }
        match serde_json::from_str::<String>(&raw) {
            Ok(plain) => Ok(Self(Text::plain(plain))),
            Err(_) => Err(DecodeError::UnknownDiscriminant {
                ty: "json text component",
                value: 0,
            }),
        }
    }
}

impl From<Text> for JsonText {
    fn from(value: Text) -> Self {
        JsonText(value)
    }
}
