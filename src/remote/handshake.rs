//! Remote API handshake body parsing.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

/// `{app_id: <id>, rtok: <token>}`, values optionally quoted.
#[allow(clippy::expect_used)]
static HANDSHAKE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{app_id: ['"]?([^'"]+)['"]?, rtok: ['"]?([^'"]+)['"]?\}"#)
        .expect("handshake regex is valid") // Static pattern, safe to panic
});

/// Fields echoed by the remote API handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HandshakeReply {
    pub(crate) app_id: String,
    pub(crate) rtok: String,
}

/// Extracts the application id and echoed token from a handshake body.
pub(crate) fn parse_reply(body: &str) -> Option<HandshakeReply> {
    let captures = HANDSHAKE_PATTERN.captures(body)?;
    Some(HandshakeReply {
        app_id: captures.get(1)?.as_str().to_string(),
        rtok: captures.get(2)?.as_str().to_string(),
    })
}

/// A fresh non-negative token for one handshake.
pub(crate) fn new_token() -> String {
    rand::thread_rng().gen_range(0..i64::MAX).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_quoted_reply() {
        let reply = parse_reply("{app_id: 's~myapp', rtok: '12345'}").unwrap();
        assert_eq!(reply.app_id, "s~myapp");
        assert_eq!(reply.rtok, "12345");
    }

    #[test]
    fn test_parse_unquoted_reply() {
        let reply = parse_reply("{app_id: dev~myapp, rtok: 99}").unwrap();
        assert_eq!(reply.app_id, "dev~myapp");
        assert_eq!(reply.rtok, "99");
    }

    #[test]
    fn test_parse_reply_with_surrounding_text() {
        let reply = parse_reply("ok\n{app_id: \"x\", rtok: \"7\"}\n").unwrap();
        assert_eq!(reply.app_id, "x");
    }

    #[test]
    fn test_parse_rejects_other_bodies() {
        assert!(parse_reply("<html>Sign in</html>").is_none());
        assert!(parse_reply("{app_id: x}").is_none());
        assert!(parse_reply("").is_none());
    }

    #[test]
    fn test_new_token_is_numeric() {
        let token = new_token();
        assert!(!token.is_empty());
        assert!(token.chars().all(|ch| ch.is_ascii_digit()));
    }
}
