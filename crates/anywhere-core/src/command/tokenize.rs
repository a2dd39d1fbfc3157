//! Shell-like tokenization without execution or expansion.
//!
//! Supports single quotes (literal), double quotes (with `\"`, `\\`, `\$`
//! and `` \` `` escapes) and backslash escapes outside quotes. `$VAR`, globs
//! and command substitution are kept verbatim.

use super::CommandError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Unquoted,
    Single,
    Double,
}

/// Split a command line into argument tokens.
pub fn tokenize(input: &str) -> Result<Vec<String>, CommandError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // Distinguishes `''` (an empty argument) from no argument at all.
    let mut in_token = false;
    let mut state = State::Unquoted;
    let mut quote_start = 0;

    let mut chars = input.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        match state {
            State::Unquoted => match c {
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                '\'' => {
                    state = State::Single;
                    quote_start = pos;
                    in_token = true;
                }
                '"' => {
                    state = State::Double;
                    quote_start = pos;
                    in_token = true;
                }
                '\\' => match chars.next() {
                    // Line continuation
                    Some((_, '\n')) => {}
                    Some((_, escaped)) => {
                        current.push(escaped);
                        in_token = true;
                    }
                    None => return Err(CommandError::DanglingEscape),
                },
                other => {
                    current.push(other);
                    in_token = true;
                }
            },
            State::Single => {
                if c == '\'' {
                    state = State::Unquoted;
                } else {
                    current.push(c);
                }
            }
            State::Double => match c {
                '"' => state = State::Unquoted,
                '\\' => match chars.peek().copied() {
                    Some((_, next @ ('"' | '\\' | '$' | '`'))) => {
                        chars.next();
                        current.push(next);
                    }
                    Some((_, '\n')) => {
                        chars.next();
                    }
                    _ => current.push('\\'),
                },
                other => current.push(other),
            },
        }
    }

    match state {
        State::Single => {
            return Err(CommandError::UnbalancedQuote {
                quote: '\'',
                position: quote_start,
            });
        }
        State::Double => {
            return Err(CommandError::UnbalancedQuote {
                quote: '"',
                position: quote_start,
            });
        }
        State::Unquoted => {}
    }

    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn is_safe_unquoted(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./_-^".contains(c))
}

/// Quote a single token so `tokenize` reads it back unchanged.
pub fn quote(token: &str) -> String {
    if is_safe_unquoted(token) {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r#"'"'"'"#))
    }
}

/// Render tokens as a command line that tokenizes back to the same tokens.
pub fn join_tokens<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|t| quote(t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(input: &str) -> Vec<String> {
        tokenize(input).unwrap()
    }

    #[test]
    fn splits_on_any_whitespace() {
        assert_eq!(toks("  npx\t-y   pkg \n"), ["npx", "-y", "pkg"]);
    }

    #[test]
    fn quotes_group_words() {
        assert_eq!(
            toks(r#"uvx tool --name "hello world" 'it''s'"#),
            ["uvx", "tool", "--name", "hello world", "its"]
        );
    }

    #[test]
    fn single_quotes_are_literal() {
        assert_eq!(toks(r#"echo '$HOME \n "x"'"#), ["echo", r#"$HOME \n "x""#]);
    }

    #[test]
    fn double_quote_escapes() {
        assert_eq!(toks(r#"say "a \"b\" \\ \x""#), ["say", r#"a "b" \ \x"#]);
    }

    #[test]
    fn backslash_escapes_outside_quotes() {
        assert_eq!(toks(r"a\ b c"), ["a b", "c"]);
    }

    #[test]
    fn empty_quotes_are_an_argument() {
        assert_eq!(toks(r#"cmd "" x"#), ["cmd", "", "x"]);
    }

    #[test]
    fn variables_are_not_expanded() {
        assert_eq!(toks("run $TOKEN ${X:-y}"), ["run", "$TOKEN", "${X:-y}"]);
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        assert_eq!(
            tokenize(r#"npx "unterminated"#),
            Err(CommandError::UnbalancedQuote {
                quote: '"',
                position: 4
            })
        );
        assert!(matches!(
            tokenize("uvx 'oops"),
            Err(CommandError::UnbalancedQuote { quote: '\'', .. })
        ));
    }

    #[test]
    fn trailing_backslash_is_rejected() {
        assert_eq!(tokenize("npx pkg \\"), Err(CommandError::DanglingEscape));
    }

    #[test]
    fn join_then_tokenize_preserves_tokens() {
        let tokens = vec![
            "uvx".to_string(),
            "it's".to_string(),
            String::new(),
            "a b".to_string(),
            "$X".to_string(),
            "@scope/pkg@1.0".to_string(),
        ];
        assert_eq!(tokenize(&join_tokens(&tokens)).unwrap(), tokens);
    }
}
