//! Command line to argument list conversions.
//!
//! Compilation database entries may carry the compiler invocation as a single
//! `command` string instead of an `arguments` array. These functions convert
//! between the two representations with POSIX shell quoting rules.

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ShellSyntaxError {
    #[error("Unbalanced quoting in '{0}'")]
    UnbalancedQuote(String),
    #[error("Trailing escape character in '{0}'")]
    TrailingEscape(String),
}

#[derive(PartialEq)]
enum State {
    Plain,
    SingleQuoted,
    DoubleQuoted,
}

/// Split a command string into arguments.
///
/// Recognizes single quotes, double quotes and backslash escapes. Inside
/// double quotes the backslash only escapes the characters it would escape
/// in a shell (`"`, `` ` ``, `$`, `\`); elsewhere it stays literal.
pub fn split(input : &str) -> Result<Vec<String>, ShellSyntaxError> {
    let mut result = Vec::new();
    let mut token = String::new();
    // A token can be present yet empty (written as ''), so track it separately.
    let mut in_token = false;
    let mut state = State::Plain;

    let mut it = input.chars();
    while let Some(c) = it.next() {
        match state {
            State::Plain => {
                match c {
                    '\'' => {
                        in_token = true;
                        state = State::SingleQuoted;
                    }
                    '"' => {
                        in_token = true;
                        state = State::DoubleQuoted;
                    }
                    '\\' => {
                        match it.next() {
                            None => {
                                return Err(ShellSyntaxError::TrailingEscape(input.to_string()));
                            }
                            Some(escaped) => {
                                in_token = true;
                                token.push(escaped);
                            }
                        }
                    }
                    _ if c.is_whitespace() => {
                        if in_token {
                            result.push(std::mem::take(&mut token));
                            in_token = false;
                        }
                    }
                    _ => {
                        in_token = true;
                        token.push(c);
                    }
                }
            }
            State::SingleQuoted => {
                match c {
                    '\'' => {
                        state = State::Plain;
                    }
                    _ => {
                        token.push(c);
                    }
                }
            }
            State::DoubleQuoted => {
                match c {
                    '"' => {
                        state = State::Plain;
                    }
                    '\\' => {
                        match it.next() {
                            None => {
                                return Err(ShellSyntaxError::TrailingEscape(input.to_string()));
                            }
                            Some(escaped) if matches!(escaped, '"' | '`' | '$' | '\\') => {
                                token.push(escaped);
                            }
                            Some(escaped) => {
                                token.push('\\');
                                token.push(escaped);
                            }
                        }
                    }
                    _ => {
                        token.push(c);
                    }
                }
            }
        }
    }
    if state != State::Plain {
        return Err(ShellSyntaxError::UnbalancedQuote(input.to_string()));
    }
    if in_token {
        result.push(token);
    }
    Ok(result)
}

fn is_plain(input : &str) -> bool {
    !input.is_empty()
        && input.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-')
        })
}

/// Join arguments into a single command string.
///
/// Every token that needs it gets single-quoted, such that
/// `split(join(arguments)) == arguments` holds for any argument list.
pub fn join(arguments : &[String]) -> String {
    arguments.iter()
        .map(|it| quote(it))
        .collect::<Vec<String>>()
        .join(" ")
}

fn quote(argument : &str) -> String {
    if is_plain(argument) {
        argument.to_string()
    } else {
        // A single quote cannot appear inside single quotes; close the
        // quoting, emit it escaped, and open again.
        format!("'{}'", argument.replace('\'', r"'\''"))
    }
}
