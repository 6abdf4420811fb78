//! Notion property-value model and scalar extraction.
//!
//! A page property arrives as a typed union keyed by a `type` tag, with the
//! payload under a field named after the type. Modeled here as a tagged
//! variant with one case per supported kind plus an explicit unsupported
//! case, so extraction is a total, exhaustive match instead of a chain of
//! optional-field probes.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectOption {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RichTextFragment {
    #[serde(default)]
    pub plain_text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub start: Option<String>,
    /// Present for ranged dates; ignored by extraction.
    #[serde(default)]
    pub end: Option<String>,
}

/// One page property. Unknown kinds land in `Unsupported` rather than
/// failing deserialization.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Status {
        #[serde(default)]
        status: Option<SelectOption>,
    },
    Select {
        #[serde(default)]
        select: Option<SelectOption>,
    },
    MultiSelect {
        #[serde(default)]
        multi_select: Vec<SelectOption>,
    },
    RichText {
        #[serde(default)]
        rich_text: Vec<RichTextFragment>,
    },
    Date {
        #[serde(default)]
        date: Option<DateRange>,
    },
    Title {
        #[serde(default)]
        title: Vec<RichTextFragment>,
    },
    #[serde(other)]
    Unsupported,
}

impl PropertyValue {
    /// Pull the single display value out of a property. Pure and total —
    /// the only outcomes are present and absent.
    ///
    /// - status/select: the option name verbatim.
    /// - multi_select: the first option only (multi-valued semantics are
    ///   not supported).
    /// - rich_text/title: all fragments' plain text, whitespace runs
    ///   collapsed to single spaces, trimmed.
    /// - date: the range start only.
    pub fn extract(&self) -> Option<String> {
        match self {
            PropertyValue::Status { status } => {
                status.as_ref().and_then(|o| non_blank(&o.name))
            }
            PropertyValue::Select { select } => {
                select.as_ref().and_then(|o| non_blank(&o.name))
            }
            PropertyValue::MultiSelect { multi_select } => {
                multi_select.first().and_then(|o| non_blank(&o.name))
            }
            PropertyValue::RichText { rich_text } => extract_fragments(rich_text),
            PropertyValue::Title { title } => extract_fragments(title),
            PropertyValue::Date { date } => date
                .as_ref()
                .and_then(|d| d.start.as_deref())
                .and_then(non_blank),
            PropertyValue::Unsupported => None,
        }
    }
}

fn extract_fragments(fragments: &[RichTextFragment]) -> Option<String> {
    let joined: String = fragments
        .iter()
        .map(|f| f.plain_text.as_str())
        .collect::<Vec<_>>()
        .join("");
    let collapsed = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    non_blank(&collapsed)
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
