use serde::{Deserialize, Serialize};

use crate::feed::Item;

/// Street and optional house number a subscriber is interested in.
///
/// An empty component matches every post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressFilter {
    pub street: String,
    #[serde(default)]
    pub number: String,
}

impl AddressFilter {
    pub fn new(street: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            street: street.into(),
            number: number.into(),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        contains_folded(&text, &self.street) && contains_folded(&text, &self.number)
    }
}

impl std::fmt::Display for AddressFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.number.is_empty() {
            f.write_str(&self.street)
        } else {
            write!(f, "{} {}", self.street, self.number)
        }
    }
}

fn contains_folded(lowered_text: &str, needle: &str) -> bool {
    needle.is_empty() || lowered_text.contains(&needle.to_lowercase())
}

/// Posts whose text matches both components of the filter, in input order.
pub fn match_items<'a, I>(items: I, filter: &AddressFilter) -> Vec<Item>
where
    I: IntoIterator<Item = &'a Item>,
{
    items
        .into_iter()
        .filter(|item| filter.matches(&item.text))
        .cloned()
        .collect()
}
