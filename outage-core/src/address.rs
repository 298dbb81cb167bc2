use crate::matcher::AddressFilter;

/// Splits free text such as `"Куйбышева 8"` into street and house number.
///
/// The last word becomes the house number when it contains a digit (`8`,
/// `12а`, `5/2`); otherwise the whole text is the street. A single word is
/// always a street.
pub fn parse_address(input: &str) -> Option<AddressFilter> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    let (last, rest) = parts.split_last()?;

    if rest.is_empty() {
        return Some(AddressFilter::new(*last, ""));
    }

    if last.chars().any(char::is_numeric) {
        Some(AddressFilter::new(rest.join(" "), *last))
    } else {
        Some(AddressFilter::new(parts.join(" "), ""))
    }
}
