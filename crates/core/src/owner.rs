use std::sync::LazyLock;

use regex::Regex;

/// Visibility tag followed by a parenthesised owner token, e.g.
/// `~hidden(usr_1)` or `~group(grp_2)`.
static OWNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(hidden|friends|private|group)\(([^)]+)\)").expect("valid regex")
});

/// Extract the owner id from an instance location string.
///
/// The first `hidden(...)`, `friends(...)`, `private(...)` or `group(...)`
/// tag wins. Returns `""` when no tag is present.
///
/// ```
/// use delivery_core::parse_owner;
///
/// assert_eq!(parse_owner("wrld_a:1~hidden(usr_1)~region(jp)"), "usr_1");
/// assert_eq!(parse_owner("wrld_a:1~region(jp)"), "");
/// ```
pub fn parse_owner(location: &str) -> &str {
    OWNER_RE
        .captures(location)
        .and_then(|c| c.get(2))
        .map_or("", |m| m.as_str())
}
