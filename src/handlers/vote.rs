use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // A vote is a chat message consisting of a single letter
    static ref VOTE_PATTERN: Regex = Regex::new(r"^\s*([A-Za-z])\s*$").unwrap();
}

// Normalizes a raw chat message into a vote letter, if it is one.
//
// Whether the letter is an active option is for the tally to decide.
pub fn parse_vote_message(content: &str) -> Option<char> {
    VOTE_PATTERN
        .captures(content)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().chars().next())
        .map(|c| c.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_letters_are_votes() {
        assert_eq!(parse_vote_message("a"), Some('A'));
        assert_eq!(parse_vote_message(" C "), Some('C'));
        assert_eq!(parse_vote_message("z"), Some('Z'));
    }

    #[test]
    fn chatter_is_not_a_vote() {
        for message in ["", "ab", "A!", "vote A", "1", "ä", "!a"] {
            assert_eq!(parse_vote_message(message), None, "{message:?}");
        }
    }
}
