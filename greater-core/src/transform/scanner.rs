//! Comment and string blanking
//!
//! Produces a copy of the source in which comment bodies and string literal
//! contents are replaced by spaces. Every blanked character becomes as many
//! spaces as it has UTF-8 bytes, and newlines are kept, so byte offsets in
//! the copy are valid offsets into the original. Quote delimiters survive,
//! which lets the import regexes find literal boundaries without ever
//! matching text that lives inside a comment or another string.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// JavaScript/TypeScript: `//` and `/* */` comments, three quote styles
    Script,
    /// CSS: only `/* */` comments, no template literals
    Css,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    LineComment,
    BlockComment,
    SingleQuote,
    DoubleQuote,
    Template,
}

impl State {
    fn closing_quote(self) -> Option<char> {
        match self {
            State::SingleQuote => Some('\''),
            State::DoubleQuote => Some('"'),
            State::Template => Some('`'),
            _ => None,
        }
    }
}

fn blank(out: &mut String, c: char) {
    if c == '\n' {
        out.push('\n');
    } else {
        out.extend(std::iter::repeat(' ').take(c.len_utf8()));
    }
}

/// Blank comments and string contents in a single pass
pub fn sanitize(source: &str, mode: ScanMode) -> String {
    let mut out = String::with_capacity(source.len());
    let mut state = State::Normal;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                '/' if mode == ScanMode::Script && chars.peek() == Some(&'/') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::BlockComment;
                }
                '\'' => {
                    out.push(c);
                    state = State::SingleQuote;
                }
                '"' => {
                    out.push(c);
                    state = State::DoubleQuote;
                }
                '`' if mode == ScanMode::Script => {
                    out.push(c);
                    state = State::Template;
                }
                _ => out.push(c),
            },

            State::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = State::Normal;
                } else {
                    blank(&mut out, c);
                }
            }

            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = State::Normal;
                } else {
                    blank(&mut out, c);
                }
            }

            State::SingleQuote | State::DoubleQuote | State::Template => {
                if c == '\\' {
                    blank(&mut out, c);
                    if let Some(escaped) = chars.next() {
                        blank(&mut out, escaped);
                    }
                } else if Some(c) == state.closing_quote() {
                    out.push(c);
                    state = State::Normal;
                } else if c == '\n' && state != State::Template {
                    // Unterminated literal; resync on the next line
                    out.push('\n');
                    state = State::Normal;
                } else {
                    blank(&mut out, c);
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_preserves_byte_offsets() {
        let source = "const s = 'héllo ✓'; // ünïcode\nimport x from \"y\";";
        let sanitized = sanitize(source, ScanMode::Script);

        assert_eq!(sanitized.len(), source.len());
        assert_eq!(
            sanitized.find("import").unwrap(),
            source.find("import").unwrap()
        );
        assert!(!sanitized.contains("héllo"));
        assert!(!sanitized.contains("ünïcode"));
    }

    #[test]
    fn test_blanks_comments_and_strings() {
        let source = "a /* import 'x' */ b // import 'y'\nc 'q' \"r\" `s`";
        let sanitized = sanitize(source, ScanMode::Script);

        assert_eq!(sanitized, "a                  b              \nc ' ' \" \" ` `");
    }

    #[test]
    fn test_escapes() {
        let source = r#"'it\'s' "say \"hi\"" x"#;
        let sanitized = sanitize(source, ScanMode::Script);

        assert!(sanitized.ends_with(" x"));
        assert_eq!(sanitized.matches('\'').count(), 2);
        assert_eq!(sanitized.matches('"').count(), 2);
    }

    #[test]
    fn test_template_spans_lines() {
        let source = "`line one\nimport 'x'`\nimport y from 'z'";
        let sanitized = sanitize(source, ScanMode::Script);
        let lines: Vec<&str> = sanitized.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(!lines[1].contains("import"));
        assert!(lines[2].starts_with("import y from '"));
    }

    #[test]
    fn test_css_mode_keeps_double_slash() {
        let source = "@import url(\"https://cdn.example.com/a.css\");\n/* @import 'b'; */";
        let sanitized = sanitize(source, ScanMode::Css);

        assert!(sanitized.starts_with("@import url(\""));
        assert!(!sanitized.contains("@import 'b'"));
        assert_eq!(sanitized.matches("@import").count(), 1);
    }

    #[test]
    fn test_unterminated_string_resyncs() {
        let source = "const bad = 'oops\nimport a from 'b'";
        let sanitized = sanitize(source, ScanMode::Script);
        assert!(sanitized.lines().nth(1).unwrap().starts_with("import a from '"));
    }
}
