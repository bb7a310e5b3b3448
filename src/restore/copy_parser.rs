//! Tokenizes a single `COPY ... FROM stdin; ... \.` block's body into
//! rows of field strings, distinguishing the `\N` null sentinel from
//! other backslash escapes. Hand-rolled rather than pulled in via
//! `sqlparser` (which parses SQL statements, not the tab-separated COPY
//! wire format) — this is a tokenizer for a text format, not a SQL
//! parser, so the dependency wouldn't actually help here.

/// One field from a COPY row: `None` for the `\N` null sentinel, `Some`
/// with backslash escapes already resolved otherwise.
pub type Field = Option<String>;

pub fn parse_copy_block(body: &str) -> Vec<Vec<Field>> {
    body.lines()
        .filter(|line| *line != "\\.")
        .map(parse_row)
        .collect()
}

fn parse_row(line: &str) -> Vec<Field> {
    line.split('\t').map(parse_field).collect()
}

fn parse_field(raw: &str) -> Field {
    if raw == "\\N" {
        return None;
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('N') => out.push_str("\\N"), // literal backslash-N, not the null sentinel (only bare \N is)
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sentinel_becomes_none() {
        let rows = parse_copy_block("1\t\\N\tfoo\n\\.\n");
        assert_eq!(rows, vec![vec![Some("1".into()), None, Some("foo".into())]]);
    }

    #[test]
    fn escaped_tab_and_newline_are_decoded() {
        let rows = parse_copy_block("1\ta\\tb\tc\\nd\n\\.\n");
        assert_eq!(
            rows,
            vec![vec![Some("1".into()), Some("a\tb".into()), Some("c\nd".into())]]
        );
    }

    #[test]
    fn multiple_rows_are_each_parsed() {
        let rows = parse_copy_block("1\tfoo\n2\tbar\n\\.\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![Some("2".into()), Some("bar".into())]);
    }

    #[test]
    fn terminator_line_is_excluded() {
        let rows = parse_copy_block("1\tfoo\n\\.\n");
        assert_eq!(rows.len(), 1);
    }
}
