//! `WWW-Authenticate` challenge parsing
//!
//! Handles a single challenge of the form
//! `Scheme key=value, key="quoted ""value"""`. The parameter list is split
//! into tokens on `"`, `,` and `=`, then walked by a small state machine.

use crate::error::{RegistryError, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub scheme: String,
    /// Parameter names are lowercased
    pub params: HashMap<String, String>,
}

impl Challenge {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_scheme(&self, scheme: &str) -> bool {
        self.scheme.eq_ignore_ascii_case(scheme)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Quote,
    Comma,
    Equals,
    Literal(&'a str),
}

impl Token<'_> {
    fn text(&self) -> &str {
        match self {
            Token::Quote => "\"",
            Token::Comma => ",",
            Token::Equals => "=",
            Token::Literal(s) => s,
        }
    }
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = 0;
    for (i, c) in input.char_indices() {
        let special = match c {
            '"' => Token::Quote,
            ',' => Token::Comma,
            '=' => Token::Equals,
            _ => continue,
        };
        if start < i {
            tokens.push(Token::Literal(&input[start..i]));
        }
        tokens.push(special);
        start = i + 1;
    }
    if start < input.len() {
        tokens.push(Token::Literal(&input[start..]));
    }
    tokens
}

enum State {
    ExpectKey,
    ExpectEquals(String),
    ExpectValue(String),
    InsideQuote(String, String),
    AfterQuote(String, String),
    ExpectComma,
}

fn is_blank(token: &Token<'_>) -> bool {
    matches!(token, Token::Literal(s) if s.trim().is_empty())
}

fn unexpected(index: usize, token: &Token<'_>, expected: &str, header: &str) -> RegistryError {
    RegistryError::Parse(format!(
        "expected {} but found '{}' at token {} of WWW-Authenticate header \"{}\"",
        expected,
        token.text(),
        index,
        header
    ))
}

/// Parses one `WWW-Authenticate` challenge
pub fn parse_challenge(header: &str) -> Result<Challenge> {
    let header = header.trim();
    let (scheme, rest) = match header.find(|c: char| c.is_ascii_whitespace()) {
        Some(pos) => (&header[..pos], &header[pos + 1..]),
        None => (header, ""),
    };
    if scheme.is_empty() {
        return Err(RegistryError::Parse("empty WWW-Authenticate header".to_string()));
    }

    let tokens = tokenize(rest);
    let mut params = HashMap::new();
    let mut state = State::ExpectKey;
    let mut after_comma = false;

    for (index, token) in tokens.iter().enumerate() {
        state = match state {
            State::ExpectKey => match token {
                t if is_blank(t) => State::ExpectKey,
                Token::Literal(key) => {
                    after_comma = false;
                    State::ExpectEquals(key.trim().to_ascii_lowercase())
                }
                t => return Err(unexpected(index, t, "a parameter name", header)),
            },
            State::ExpectEquals(key) => match token {
                Token::Equals => State::ExpectValue(key),
                t if is_blank(t) => State::ExpectEquals(key),
                t => {
                    return Err(RegistryError::Parse(format!(
                        "missing '=' after key '{}' (found '{}' at token {}) in WWW-Authenticate header \"{}\"",
                        key,
                        t.text(),
                        index,
                        header
                    )));
                }
            },
            State::ExpectValue(key) => match token {
                Token::Quote => State::InsideQuote(key, String::new()),
                Token::Literal(value) if !value.trim().is_empty() => {
                    params.insert(key, value.trim().to_string());
                    State::ExpectComma
                }
                t if is_blank(t) => State::ExpectValue(key),
                t => return Err(unexpected(index, t, &format!("a value for '{}'", key), header)),
            },
            State::InsideQuote(key, mut value) => match token {
                Token::Quote => State::AfterQuote(key, value),
                t => {
                    value.push_str(t.text());
                    State::InsideQuote(key, value)
                }
            },
            State::AfterQuote(key, mut value) => match token {
                // `""` inside a quoted value is an escaped quote
                Token::Quote => {
                    value.push('"');
                    State::InsideQuote(key, value)
                }
                Token::Comma => {
                    params.insert(key, value);
                    after_comma = true;
                    State::ExpectKey
                }
                t if is_blank(t) => {
                    params.insert(key, value);
                    State::ExpectComma
                }
                t => return Err(unexpected(index, t, "',' after quoted value", header)),
            },
            State::ExpectComma => match token {
                Token::Comma => {
                    after_comma = true;
                    State::ExpectKey
                }
                t if is_blank(t) => State::ExpectComma,
                t => return Err(unexpected(index, t, "','", header)),
            },
        };
    }

    match state {
        State::ExpectKey if after_comma => Err(RegistryError::Parse(format!(
            "trailing ',' in WWW-Authenticate header \"{}\"",
            header
        ))),
        State::ExpectKey | State::ExpectComma => Ok(Challenge {
            scheme: scheme.to_string(),
            params,
        }),
        State::AfterQuote(key, value) => {
            params.insert(key, value);
            Ok(Challenge {
                scheme: scheme.to_string(),
                params,
            })
        }
        State::ExpectEquals(key) => Err(RegistryError::Parse(format!(
            "missing '=' after key '{}' at end of WWW-Authenticate header \"{}\"",
            key, header
        ))),
        State::ExpectValue(key) => Err(RegistryError::Parse(format!(
            "missing value for key '{}' in WWW-Authenticate header \"{}\"",
            key, header
        ))),
        State::InsideQuote(key, _) => Err(RegistryError::Parse(format!(
            "unterminated quote in value of '{}' in WWW-Authenticate header \"{}\"",
            key, header
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_challenge() {
        let challenge =
            parse_challenge(r#"Bearer realm="https://auth.example/token",service="registry.example""#).unwrap();
        assert_eq!(challenge.scheme, "Bearer");
        assert_eq!(challenge.params.len(), 2);
        assert_eq!(challenge.param("realm"), Some("https://auth.example/token"));
        assert_eq!(challenge.param("service"), Some("registry.example"));
    }

    #[test]
    fn test_scope_with_commas_and_colons() {
        let challenge = parse_challenge(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/busybox:pull,push""#,
        )
        .unwrap();
        assert_eq!(challenge.param("scope"), Some("repository:library/busybox:pull,push"));
    }

    #[test]
    fn test_basic_and_unquoted_values() {
        let challenge = parse_challenge("Basic realm=Registry, charset=UTF-8").unwrap();
        assert!(challenge.is_scheme("basic"));
        assert_eq!(challenge.param("realm"), Some("Registry"));
        assert_eq!(challenge.param("Charset"), Some("UTF-8"));
    }

    #[test]
    fn test_scheme_only() {
        let challenge = parse_challenge("Basic").unwrap();
        assert_eq!(challenge.scheme, "Basic");
        assert!(challenge.params.is_empty());
    }

    #[test]
    fn test_escaped_quote() {
        let challenge = parse_challenge(r#"Bearer realm="say ""hi""",service="x""#).unwrap();
        assert_eq!(challenge.param("realm"), Some(r#"say "hi""#));
        assert_eq!(challenge.param("service"), Some("x"));
    }

    #[test]
    fn test_empty_quoted_value() {
        let challenge = parse_challenge(r#"Bearer realm="",service="x""#).unwrap();
        assert_eq!(challenge.param("realm"), Some(""));
    }

    #[test]
    fn test_missing_equals_names_key() {
        let err = parse_challenge(r#"Bearer realm "https://auth.example/token""#).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, RegistryError::Parse(_)));
        assert!(message.contains("'realm'"), "{}", message);

        let err = parse_challenge("Bearer realm").unwrap_err();
        assert!(err.to_string().contains("'realm'"));
    }

    #[test]
    fn test_malformed_headers() {
        // unterminated quote
        assert!(parse_challenge(r#"Bearer realm="https://x"#).is_err());
        // missing comma between params
        assert!(parse_challenge(r#"Bearer realm="a" service="b""#).is_err());
        // garbage after quoted value
        assert!(parse_challenge(r#"Bearer realm="a"x"#).is_err());
        // trailing comma
        assert!(parse_challenge(r#"Bearer realm="a","#).is_err());
        // missing value
        assert!(parse_challenge("Bearer realm=").is_err());
        assert!(parse_challenge("").is_err());
    }
}
