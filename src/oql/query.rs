//! Splits query text into its clauses.
//!
//! `select <expr> [from [instanceof] <class> [<identifier>] [where <expr>]]`
//!
//! Keywords are only recognised as whole words outside string literals and
//! brackets, so expressions keep their original text. After `from`, square
//! brackets do not nest since JVM class names such as `[C` open one without
//! closing it.

use crate::{Error, Result};

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Query {
    Select {
        selection: String,
        from: Option<FromClause>,
    },
    /// Anything not starting with `select` is run as a script.
    Script(String),
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct FromClause {
    pub class_name: String,
    pub instanceof: bool,
    pub identifier: Option<String>,
    pub predicate: Option<String>,
}

/// Byte ranges of top-level words, starting at `offset`.
fn words(text: &str, offset: usize, square_brackets_nest: bool) -> Vec<(usize, usize)> {
    let mut words = vec![];
    let mut start = None;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0usize;
    for (i, c) in text[offset..].char_indices() {
        let i = i + offset;
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() && depth == 0 {
            if let Some(s) = start.take() {
                words.push((s, i));
            }
            continue;
        }
        if start.is_none() {
            start = Some(i);
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '{' => depth += 1,
            ')' | '}' => depth = depth.saturating_sub(1),
            '[' if square_brackets_nest => depth += 1,
            ']' if square_brackets_nest => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    if let Some(s) = start {
        words.push((s, text.len()));
    }
    words
}

pub(crate) fn parse(text: &str) -> Result<Query> {
    let head = words(text, 0, true);
    let head_word = |i: usize| head.get(i).map(|(s, e)| &text[*s..*e]);
    if head_word(0) != Some("select") {
        return Ok(Query::Script(text.trim().to_string()));
    }
    let from_at = (1..head.len()).find(|i| head_word(*i) == Some("from"));
    let selection_end = from_at.map_or(text.len(), |i| head[i].0);
    let selection = text[head[0].1..selection_end].trim();
    if selection.is_empty() {
        return Err(Error::QuerySyntax("selection expression expected".to_string()));
    }
    let Some(from_at) = from_at else {
        return Ok(Query::Select {
            selection: selection.to_string(),
            from: None,
        });
    };

    let words = words(text, head[from_at].1, false);
    let word = |i: usize| words.get(i).map(|(s, e)| &text[*s..*e]);
    let mut next = 0;
    let instanceof = word(next) == Some("instanceof");
    if instanceof {
        next += 1;
    }
    let class_name = word(next)
        .ok_or_else(|| Error::QuerySyntax("class name expected after 'from'".to_string()))?
        .to_string();
    next += 1;
    let identifier = match word(next) {
        Some(w) if w != "where" => {
            next += 1;
            Some(w.to_string())
        }
        _ => None,
    };
    let predicate = match word(next) {
        None => None,
        Some("where") => {
            let predicate = text[words[next].1..].trim();
            if predicate.is_empty() {
                return Err(Error::QuerySyntax(
                    "expression expected after 'where'".to_string(),
                ));
            }
            Some(predicate.to_string())
        }
        Some(_) => return Err(Error::QuerySyntax("'where' expected".to_string())),
    };
    Ok(Query::Select {
        selection: selection.to_string(),
        from: Some(FromClause {
            class_name,
            instanceof,
            identifier,
            predicate,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syntax_error(text: &str) -> String {
        match parse(text) {
            Err(Error::QuerySyntax(message)) => message,
            other => panic!("expected a syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_full_query() {
        let query = parse("select  s.value  from instanceof java.lang.String s where s.count > 10").unwrap();
        assert_eq!(
            query,
            Query::Select {
                selection: "s.value".to_string(),
                from: Some(FromClause {
                    class_name: "java.lang.String".to_string(),
                    instanceof: true,
                    identifier: Some("s".to_string()),
                    predicate: Some("s.count > 10".to_string()),
                }),
            }
        );
    }

    #[test]
    fn test_keywords_inside_literals_and_brackets() {
        let query = parse("select map(x, 'it from y') from Foo f where f.name == \"a where b\"").unwrap();
        let Query::Select { selection, from } = query else {
            panic!("expected a select");
        };
        assert_eq!(selection, "map(x, 'it from y')");
        assert_eq!(from.unwrap().predicate.unwrap(), "f.name == \"a where b\"");

        let query = parse("select { from: 1,  where: 2 }").unwrap();
        assert_eq!(
            query,
            Query::Select {
                selection: "{ from: 1,  where: 2 }".to_string(),
                from: None,
            }
        );
    }

    #[test]
    fn test_optional_identifier() {
        let Query::Select { from, .. } = parse("select 1 from [C").unwrap() else {
            panic!("expected a select");
        };
        let from = from.unwrap();
        assert_eq!(from.class_name, "[C");
        assert_eq!(from.identifier, None);
        assert!(!from.instanceof);

        let Query::Select { from, .. } = parse("select a from [Ljava.lang.Object; a where a[0] != null").unwrap() else {
            panic!("expected a select");
        };
        let from = from.unwrap();
        assert_eq!(from.class_name, "[Ljava.lang.Object;");
        assert_eq!(from.identifier.as_deref(), Some("a"));
        assert_eq!(from.predicate.as_deref(), Some("a[0] != null"));

        let Query::Select { selection, from } = parse("select [a, b][0] from [[I a").unwrap() else {
            panic!("expected a select");
        };
        assert_eq!(selection, "[a, b][0]");
        assert_eq!(from.unwrap().class_name, "[[I");
    }

    #[test]
    fn test_scripts() {
        assert_eq!(
            parse("  heap.findClass('x')  ").unwrap(),
            Query::Script("heap.findClass('x')".to_string())
        );
        assert_eq!(parse("selected").unwrap(), Query::Script("selected".to_string()));
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(syntax_error("select"), "selection expression expected");
        assert_eq!(syntax_error("select from Foo f"), "selection expression expected");
        assert_eq!(syntax_error("select x from"), "class name expected after 'from'");
        assert_eq!(syntax_error("select x from instanceof"), "class name expected after 'from'");
        assert_eq!(syntax_error("select x from Foo f g"), "'where' expected");
        assert_eq!(syntax_error("select x from Foo f where  "), "expression expected after 'where'");
    }
}
