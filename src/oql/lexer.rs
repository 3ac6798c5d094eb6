use super::value::{EvalError, EvalResult};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
    Eof,
}

/// Longest operators first so that `===` wins over `==` and `=`.
const PUNCTUATION: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "(", ")", "[", "]", "{", "}", ",", ".", ":",
    ";", "?", "+", "-", "*", "/", "%", "!", "<", ">", "=",
];

pub(crate) fn tokenize(source: &str) -> EvalResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = vec![];
    let mut pos = 0;
    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
        } else if c == '/' && chars.get(pos + 1) == Some(&'/') {
            while pos < chars.len() && chars[pos] != '\n' {
                pos += 1;
            }
        } else if c == '/' && chars.get(pos + 1) == Some(&'*') {
            pos += 2;
            loop {
                if pos + 1 >= chars.len() {
                    return Err(EvalError::new("unterminated comment"));
                }
                if chars[pos] == '*' && chars[pos + 1] == '/' {
                    pos += 2;
                    break;
                }
                pos += 1;
            }
        } else if c.is_ascii_digit()
            || (c == '.' && chars.get(pos + 1).map_or(false, |d| d.is_ascii_digit()))
        {
            let (number, next) = number(&chars, pos)?;
            tokens.push(Token::Number(number));
            pos = next;
        } else if c == '"' || c == '\'' {
            let (text, next) = string(&chars, pos)?;
            tokens.push(Token::Str(text));
            pos = next;
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let start = pos;
            while pos < chars.len()
                && (chars[pos].is_alphanumeric() || chars[pos] == '_' || chars[pos] == '$')
            {
                pos += 1;
            }
            tokens.push(Token::Ident(chars[start..pos].iter().collect()));
        } else {
            let punct = PUNCTUATION
                .iter()
                .copied()
                .find(|p| p.chars().enumerate().all(|(i, pc)| chars.get(pos + i) == Some(&pc)))
                .ok_or_else(|| EvalError::new(format!("unexpected character '{}'", c)))?;
            tokens.push(Token::Punct(punct));
            pos += punct.len();
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

fn number(chars: &[char], start: usize) -> EvalResult<(f64, usize)> {
    let mut pos = start;
    if chars[pos] == '0' && matches!(chars.get(pos + 1), Some('x') | Some('X')) {
        pos += 2;
        let digits_start = pos;
        while pos < chars.len() && chars[pos].is_ascii_hexdigit() {
            pos += 1;
        }
        let digits: String = chars[digits_start..pos].iter().collect();
        let value = u64::from_str_radix(&digits, 16)
            .map_err(|_| EvalError::new(format!("malformed hex literal '0x{}'", digits)))?;
        return Ok((value as f64, pos));
    }
    while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
        pos += 1;
    }
    if pos < chars.len() && (chars[pos] == 'e' || chars[pos] == 'E') {
        let mut exp = pos + 1;
        if matches!(chars.get(exp), Some('+') | Some('-')) {
            exp += 1;
        }
        if chars.get(exp).map_or(false, |d| d.is_ascii_digit()) {
            pos = exp;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }
    let text: String = chars[start..pos].iter().collect();
    let value = text
        .parse::<f64>()
        .map_err(|_| EvalError::new(format!("malformed number '{}'", text)))?;
    Ok((value, pos))
}

fn string(chars: &[char], start: usize) -> EvalResult<(String, usize)> {
    let quote = chars[start];
    let mut pos = start + 1;
    let mut text = String::new();
    while pos < chars.len() {
        let c = chars[pos];
        if c == quote {
            return Ok((text, pos + 1));
        }
        if c == '\\' {
            pos += 1;
            let Some(escaped) = chars.get(pos) else {
                break;
            };
            match escaped {
                'n' => text.push('\n'),
                't' => text.push('\t'),
                'r' => text.push('\r'),
                '0' => text.push('\0'),
                'u' => {
                    let hex: String = chars.iter().skip(pos + 1).take(4).collect();
                    let code = u32::from_str_radix(&hex, 16)
                        .ok()
                        .filter(|_| hex.len() == 4)
                        .and_then(char::from_u32)
                        .ok_or_else(|| EvalError::new(format!("bad unicode escape '\\u{}'", hex)))?;
                    text.push(code);
                    pos += 4;
                }
                other => text.push(*other),
            }
        } else {
            text.push(c);
        }
        pos += 1;
    }
    Err(EvalError::new("unterminated string literal"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operators_longest_match() {
        let tokens = tokenize("a === b !== c <= d").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".into()),
                Token::Punct("==="),
                Token::Ident("b".into()),
                Token::Punct("!=="),
                Token::Ident("c".into()),
                Token::Punct("<="),
                Token::Ident("d".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_literals() {
        let tokens = tokenize("0x1f 2.5 1e3 'it\\'s' \"a\\nb\"").unwrap();
        assert_eq!(tokens[0], Token::Number(31.0));
        assert_eq!(tokens[1], Token::Number(2.5));
        assert_eq!(tokens[2], Token::Number(1000.0));
        assert_eq!(tokens[3], Token::Str("it's".into()));
        assert_eq!(tokens[4], Token::Str("a\nb".into()));
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = tokenize("a // line\n /* block */ b").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Ident("a".into()), Token::Ident("b".into()), Token::Eof]
        );
    }

    #[test]
    fn test_errors() {
        assert!(tokenize("'open").is_err());
        assert!(tokenize("a # b").is_err());
        assert!(tokenize("/* open").is_err());
    }
}
