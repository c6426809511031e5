//! Reader for the script bodies the backend answers with.
//!
//! A body is a sequence of `name(<json>);` statements. Whitespace, stray
//! semicolons and `/* */` or `//` comments between statements are skipped, so the
//! `/**/cb({...})` prefix some script hosts emit is accepted.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct CallbackInvocation {
    pub callback: String,
    pub argument: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptParseError {
    #[error("expected a callback name at byte {0}")]
    ExpectedCallback(usize),
    #[error("expected `{expected}` at byte {at}")]
    Expected { expected: char, at: usize },
    #[error("invalid callback argument at byte {at}: {message}")]
    Argument { at: usize, message: String },
}

pub fn parse_script(body: &str) -> Result<Vec<CallbackInvocation>, ScriptParseError> {
    let mut invocations = Vec::new();
    read_statements(body, &mut invocations)?;
    Ok(invocations)
}

/// Like [`parse_script`], but keeps the invocations read before the first
/// statement that fails to parse and returns that failure alongside them.
pub fn parse_script_prefix(body: &str) -> (Vec<CallbackInvocation>, Option<ScriptParseError>) {
    let mut invocations = Vec::new();
    let error = read_statements(body, &mut invocations).err();
    (invocations, error)
}

fn read_statements(
    body: &str,
    invocations: &mut Vec<CallbackInvocation>,
) -> Result<(), ScriptParseError> {
    let mut pos = skip_trivia(body, 0);

    while pos < body.len() {
        let name_end = scan_callback_name(body, pos);
        if name_end == pos {
            return Err(ScriptParseError::ExpectedCallback(pos));
        }
        let callback = body[pos..name_end].to_string();

        pos = expect(body, skip_trivia(body, name_end), '(')?;
        pos = skip_trivia(body, pos);

        // `cb()` is a call with an undefined argument.
        let argument = if body.as_bytes().get(pos) == Some(&b')') {
            Value::Null
        } else {
            let (argument, end) = read_argument(body, pos)?;
            pos = end;
            argument
        };

        pos = expect(body, skip_trivia(body, pos), ')')?;
        invocations.push(CallbackInvocation { callback, argument });
        pos = skip_trivia(body, pos);
    }

    Ok(())
}

/// Reads one JSON argument starting at `start` and returns it with the offset
/// just past it. Scalars are cut at the next delimiter because the streaming
/// reader refuses a number or literal followed directly by `)`.
fn read_argument(body: &str, start: usize) -> Result<(Value, usize), ScriptParseError> {
    let rest = &body[start..];
    let argument_error = |message: String| ScriptParseError::Argument { at: start, message };

    if rest.starts_with(['{', '[', '"']) {
        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
        return match stream.next() {
            Some(Ok(value)) => Ok((value, start + stream.byte_offset())),
            Some(Err(error)) => Err(argument_error(error.to_string())),
            None => Err(argument_error("missing argument".to_string())),
        };
    }

    let len = rest
        .find(|ch: char| ch == ')' || ch == ',' || ch == ';' || ch.is_ascii_whitespace())
        .unwrap_or(rest.len());
    let token = &rest[..len];
    let value = match token {
        "" => return Err(argument_error("missing argument".to_string())),
        "undefined" => Value::Null,
        literal => serde_json::from_str(literal).map_err(|error| argument_error(error.to_string()))?,
    };
    Ok((value, start + len))
}

fn scan_callback_name(body: &str, start: usize) -> usize {
    let bytes = body.as_bytes();
    let mut end = start;
    while let Some(&byte) = bytes.get(end) {
        let allowed = if end == start {
            byte.is_ascii_alphabetic() || byte == b'_' || byte == b'$'
        } else {
            byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'$' | b'.')
        };
        if !allowed {
            break;
        }
        end += 1;
    }
    end
}

fn expect(body: &str, pos: usize, expected: char) -> Result<usize, ScriptParseError> {
    if body[pos..].starts_with(expected) {
        Ok(pos + expected.len_utf8())
    } else {
        Err(ScriptParseError::Expected { expected, at: pos })
    }
}

fn skip_trivia(body: &str, mut pos: usize) -> usize {
    let bytes = body.as_bytes();
    loop {
        match bytes.get(pos) {
            Some(byte) if byte.is_ascii_whitespace() || *byte == b';' => pos += 1,
            Some(b'/') if bytes.get(pos + 1) == Some(&b'*') => {
                pos = match body[pos + 2..].find("*/") {
                    Some(offset) => pos + 2 + offset + 2,
                    None => body.len(),
                };
            }
            Some(b'/') if bytes.get(pos + 1) == Some(&b'/') => {
                pos = match body[pos + 2..].find('\n') {
                    Some(offset) => pos + 2 + offset + 1,
                    None => body.len(),
                };
            }
            _ => return pos,
        }
    }
}
