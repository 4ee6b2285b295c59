//! Quote-aware scanning over generated SQL text.
//!
//! Everything here skips single-quoted literals, quoted identifiers and
//! comments, so placeholders are only ever recognized in code positions.
//! Identifiers are quoted with `"` plus the dialect's own pair (`[ ]`,
//! backticks); a doubled closing quote is an escaped one.

/// ANSI identifier quoting, also recognized for every dialect.
pub const DOUBLE_QUOTE: (char, char) = ('"', '"');

/// Lexical state of the scanner at one character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    Code,
    SingleQuote,
    /// Inside a quoted identifier; holds the closing character.
    Identifier(char),
    LineComment,
    BlockComment,
}

/// Walks `text` and calls `visit(byte_pos, char, next_char)` for every
/// character in code position. `visit` returns how many extra characters to
/// consume (0 for just the current one).
fn scan_code<F>(text: &str, quote: (char, char), mut visit: F)
where
    F: FnMut(usize, char, &[(usize, char)]) -> usize,
{
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let len = chars.len();
    let mut state = Lex::Code;
    let mut i = 0;

    while i < len {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, n)| n);
        match state {
            Lex::LineComment => {
                if c == '\n' {
                    state = Lex::Code;
                }
            }
            Lex::BlockComment => {
                if c == '*' && next == Some('/') {
                    state = Lex::Code;
                    i += 1;
                }
            }
            Lex::SingleQuote => {
                if c == '\'' {
                    // Escaped quote ('')
                    if next == Some('\'') {
                        i += 1;
                    } else {
                        state = Lex::Code;
                    }
                }
            }
            Lex::Identifier(close) => {
                if c == close {
                    if next == Some(close) {
                        i += 1;
                    } else {
                        state = Lex::Code;
                    }
                }
            }
            Lex::Code => match c {
                '\'' => state = Lex::SingleQuote,
                '"' => state = Lex::Identifier('"'),
                _ if c == quote.0 => state = Lex::Identifier(quote.1),
                '-' if next == Some('-') => state = Lex::LineComment,
                '/' if next == Some('*') => {
                    state = Lex::BlockComment;
                    i += 1;
                }
                _ => {
                    i += visit(pos, c, &chars[i + 1..]);
                }
            },
        }
        i += 1;
    }
}

/// Byte ranges of the `;`-separated statements in `text`, skipping blanks.
pub fn statement_boundaries(text: &str) -> Vec<(usize, usize)> {
    let mut boundaries = Vec::new();
    let mut start = 0;

    scan_code(text, DOUBLE_QUOTE, |pos, c, _| {
        if c == ';' {
            if !text[start..pos].trim().is_empty() {
                boundaries.push((start, pos));
            }
            start = pos + c.len_utf8();
        }
        0
    });

    if start < text.len() && !text[start..].trim().is_empty() {
        boundaries.push((start, text.len()));
    }

    boundaries
}

/// Splits a semicolon-joined batch into its trimmed statements.
pub fn split_statements(text: &str) -> Vec<&str> {
    statement_boundaries(text)
        .into_iter()
        .map(|(start, end)| text[start..end].trim())
        .collect()
}

/// Formats the placeholder token for plan entry `index`.
pub fn token(index: usize) -> String {
    format!("{{{{{}}}}}", index)
}

/// Replaces every `{{n}}` token with `replacement(n)`.
///
/// Tokens with no replacement are left in place.
pub fn substitute_tokens<'r, F>(template: &str, quote: (char, char), mut replacement: F) -> String
where
    F: FnMut(usize) -> Option<&'r str>,
{
    let mut out = String::with_capacity(template.len());
    let mut copied = 0;

    scan_code(template, quote, |pos, c, rest| {
        if c != '{' || rest.first().map(|&(_, n)| n) != Some('{') {
            return 0;
        }
        let digits: String = rest[1..]
            .iter()
            .map(|&(_, d)| d)
            .take_while(|d| d.is_ascii_digit())
            .collect();
        if digits.is_empty() {
            return 0;
        }
        let close = 1 + digits.len();
        let closed = rest.get(close).map(|&(_, n)| n) == Some('}')
            && rest.get(close + 1).map(|&(_, n)| n) == Some('}');
        if !closed {
            return 0;
        }
        let Ok(index) = digits.parse::<usize>() else {
            return 0;
        };
        match replacement(index) {
            Some(text) => {
                out.push_str(&template[copied..pos]);
                out.push_str(text);
                // '{' + '{' + digits + '}' + '}'
                let token_len = 4 + digits.len();
                copied = pos + token_len;
                token_len - 1
            }
            None => 0,
        }
    });

    out.push_str(&template[copied..]);
    out
}

/// Rewrites every `<prefix><name>` parameter reference. `rename` returns the
/// replacement text (including any prefix) or `None` to keep the original.
pub fn rewrite_parameters<F>(sql: &str, prefix: char, quote: (char, char), mut rename: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0;

    scan_code(sql, quote, |pos, c, rest| {
        if c != prefix {
            return 0;
        }
        // `@@IDENTITY`, `::type` and similar are not parameters.
        match rest.first() {
            Some(&(_, n)) if n.is_ascii_alphabetic() || n == '_' => {}
            _ => return 0,
        }
        let name_len = rest
            .iter()
            .take_while(|&&(_, n)| n.is_ascii_alphanumeric() || n == '_')
            .count();
        let start = pos + c.len_utf8();
        let end = start + name_len;
        let name = &sql[start..end];
        if let Some(replacement) = rename(name) {
            out.push_str(&sql[copied..pos]);
            out.push_str(&replacement);
            copied = end;
        }
        name_len
    });

    out.push_str(&sql[copied..]);
    out
}

/// Parameter names referenced by `sql`, in order of first appearance.
pub fn parameter_names(sql: &str, prefix: char, quote: (char, char)) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    rewrite_parameters(sql, prefix, quote, |name| {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        None
    });
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_statements_respects_quotes() {
        let sql = "UPDATE t SET a = 'x;y' WHERE id = 1;UPDATE t SET a = 'z' WHERE id = 2;";
        let parts = split_statements(sql);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], "UPDATE t SET a = 'x;y' WHERE id = 1");
    }

    #[test]
    fn test_split_single_statement() {
        assert_eq!(split_statements("SELECT 1"), vec!["SELECT 1"]);
        assert!(split_statements("  ;  ").is_empty());
    }

    #[test]
    fn test_substitute_tokens() {
        let out = substitute_tokens("(a = {{0}} AND b IN ({{1}}))", DOUBLE_QUOTE, |i| match i {
            0 => Some("@a_1"),
            1 => Some("@b_1, @b_2"),
            _ => None,
        });
        assert_eq!(out, "(a = @a_1 AND b IN (@b_1, @b_2))");
    }

    #[test]
    fn test_substitute_skips_quoted_text() {
        let out = substitute_tokens("'{{0}}' || {{0}}", DOUBLE_QUOTE, |_| Some("@x"));
        assert_eq!(out, "'{{0}}' || @x");
    }

    #[test]
    fn test_substitute_multi_digit_tokens() {
        let out = substitute_tokens("{{1}} {{10}}", DOUBLE_QUOTE, |i| match i {
            1 => Some("one"),
            10 => Some("ten"),
            _ => None,
        });
        assert_eq!(out, "one ten");
    }

    #[test]
    fn test_rewrite_parameters() {
        let out = rewrite_parameters(
            "a = @Id_1 AND b = '@Id_1' AND c = @Name_1",
            '@',
            DOUBLE_QUOTE,
            |name| (name == "Id_1").then(|| "@Id_7".to_string()),
        );
        assert_eq!(out, "a = @Id_7 AND b = '@Id_1' AND c = @Name_1");
    }

    #[test]
    fn test_identity_query_is_not_a_parameter() {
        assert!(parameter_names("SELECT @@IDENTITY", '@', DOUBLE_QUOTE).is_empty());
    }

    #[test]
    fn test_parameter_names_in_order() {
        let names = parameter_names("x = :b_1 OR y = :a_1 OR z = :b_1", ':', DOUBLE_QUOTE);
        assert_eq!(names, vec!["b_1".to_string(), "a_1".to_string()]);
    }

    #[test]
    fn test_apostrophe_inside_bracket_identifier() {
        let template = "p.[Owner] AS [Owner's], (p.[Salary] * {{0}}) AS [Bonus]";
        let out = substitute_tokens(template, ('[', ']'), |_| Some("@rate_1"));
        assert_eq!(out, "p.[Owner] AS [Owner's], (p.[Salary] * @rate_1) AS [Bonus]");
    }

    #[test]
    fn test_escaped_closing_quote_stays_inside_identifier() {
        let out = substitute_tokens("`it``s {{0}}` = {{0}}", ('`', '`'), |_| Some("@x"));
        assert_eq!(out, "`it``s {{0}}` = @x");
        let names = parameter_names("[a]]'b] = @Id_1 AND [@Skip] = @Name_1", '@', ('[', ']'));
        assert_eq!(names, vec!["Id_1".to_string(), "Name_1".to_string()]);
    }
}
