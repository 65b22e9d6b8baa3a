//! Reserved verbs and routing keys.

pub use verbmux_frame::ERROR_VERB;

/// Separates a mount prefix from the rest of the verb.
pub const VERB_DELIMITER: char = ':';

/// Metadata key holding the live-connection snapshot.
pub const SOCKETS_KEY: &str = "sockets";

/// Routing key for a verb. Routing is case-insensitive.
pub fn normalize_verb(verb: &str) -> String {
    verb.to_lowercase()
}

/// Split on the first delimiter into `(prefix, rest)`.
pub fn split_verb(verb: &str) -> Option<(&str, &str)> {
    verb.split_once(VERB_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_on_first_delimiter_only() {
        assert_eq!(split_verb("message:insert"), Some(("message", "insert")));
        assert_eq!(split_verb("a:b:c"), Some(("a", "b:c")));
        assert_eq!(split_verb("join"), None);
        assert_eq!(split_verb(":x"), Some(("", "x")));
    }

    #[test]
    fn normalize_lowercases() {
        assert_eq!(normalize_verb("Message:INSERT"), "message:insert");
    }
}
