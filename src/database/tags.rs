//! Record tags: an unordered set of strings persisted as one delimited string.

use std::collections::BTreeSet;

pub const DELIMITER: char = ',';

/// Parse a stored tag string.
///
/// Comma separated when a comma is present, otherwise whitespace separated
/// (older rows), with double quotes grouping words.
pub fn parse_tag_input(input: &str) -> BTreeSet<String> {
    let input = input.trim();
    if input.is_empty() {
        return BTreeSet::new();
    }
    if input.contains(DELIMITER) {
        return input
            .split(DELIMITER)
            .map(|t| t.trim().trim_matches('"').trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
    }

    let mut tags = BTreeSet::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in input.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tags.insert(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    let last = current.trim();
    if !last.is_empty() {
        tags.insert(last.to_string());
    }
    tags
}

/// Serialize a tag set for storage. A lone tag containing whitespace gets a
/// trailing delimiter so it is not split apart when parsed back.
pub fn join_tags(tags: &BTreeSet<String>) -> String {
    let mut joined = tags.iter().map(String::as_str).collect::<Vec<_>>().join(&DELIMITER.to_string());
    if tags.len() == 1 && joined.contains(char::is_whitespace) {
        joined.push(DELIMITER);
    }
    joined
}

/// Normalize submitted tags into a set, rejecting values that cannot be stored
pub fn normalize<I, S>(tags: I) -> Result<BTreeSet<String>, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = BTreeSet::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if tag.is_empty() {
            continue;
        }
        if let Some(bad) = tag.chars().find(|c| *c == DELIMITER || *c == '"') {
            return Err(format!("tag '{}' must not contain '{}'", tag, bad));
        }
        set.insert(tag.to_string());
    }
    Ok(set)
}
