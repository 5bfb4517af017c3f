use crate::models::ConsentReply;

const GRANT_WORDS: &[&str] = &["yes", "y", "ok", "okay", "sure", "agree", "i agree", "confirm", "accept"];
const DENY_WORDS: &[&str] = &["no", "n", "nope", "deny", "decline", "don't", "dont", "refuse", "stop"];

/// Deterministic keyword parse of the consent reply. Deliberately not a
/// classifier call: consent must not depend on a model's mood.
pub fn parse_consent(text: &str) -> ConsentReply {
    let normalized = text.trim().to_lowercase();

    if GRANT_WORDS.iter().any(|w| *w == normalized) {
        return ConsentReply::Granted;
    }
    if DENY_WORDS.iter().any(|w| *w == normalized) {
        return ConsentReply::Denied;
    }

    ConsentReply::Unclear
}

pub const CONSENT_PROMPT: &str = "Before we book, do you consent to us storing the details you just shared to manage your appointment? Please reply 'yes' or 'no'.";

pub const CONSENT_REPROMPT: &str =
    "Sorry, I didn't catch that. Please reply 'yes' to consent to storing your details, or 'no' to decline.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_grants_and_denials() {
        assert_eq!(parse_consent("yes"), ConsentReply::Granted);
        assert_eq!(parse_consent("  OK "), ConsentReply::Granted);
        assert_eq!(parse_consent("I agree"), ConsentReply::Granted);
        assert_eq!(parse_consent("no"), ConsentReply::Denied);
        assert_eq!(parse_consent("Decline"), ConsentReply::Denied);
    }

    #[test]
    fn anything_else_is_unclear() {
        assert_eq!(parse_consent("what will you store?"), ConsentReply::Unclear);
        assert_eq!(parse_consent(""), ConsentReply::Unclear);
        // Embedded keywords don't count; only a direct answer does.
        assert_eq!(parse_consent("yes but also no"), ConsentReply::Unclear);
    }
}
