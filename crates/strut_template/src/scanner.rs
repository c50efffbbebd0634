use regex::Regex;

/// Cursor over an immutable input string with regex-anchored scan primitives.
/// Knows nothing about template semantics; the lexer drives it with one
/// pattern at a time until one succeeds.
pub struct Scanner<'a> {
    input: &'a str,
    cursor: usize,
    latest: Option<(usize, usize)>,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            cursor: 0,
            latest: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cursor >= self.input.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn rest(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    /// Matches `pattern` anchored at the cursor. On success the cursor moves
    /// past the match and the match becomes the latest match. Zero-length
    /// matches count as failure so a successful scan always makes progress.
    pub fn scan(&mut self, pattern: &Regex) -> bool {
        match pattern.find_at(self.input, self.cursor) {
            Some(found) if found.start() == self.cursor && found.end() > self.cursor => {
                self.latest = Some((found.start(), found.end()));
                self.cursor = found.end();
                true
            }
            _ => false,
        }
    }

    /// Like `scan` but never moves the cursor or records a latest match.
    pub fn check(&self, pattern: &Regex) -> bool {
        matches!(
            pattern.find_at(self.input, self.cursor),
            Some(found) if found.start() == self.cursor && found.end() > self.cursor
        )
    }

    /// Consumes input up to (not through) the next match of `delimiter`, or
    /// to the end of input when the delimiter never occurs again. Fails
    /// without moving when that span would be empty.
    pub fn scan_until(&mut self, delimiter: &Regex) -> bool {
        let stop = match delimiter.find_at(self.input, self.cursor) {
            Some(found) => found.start(),
            None => self.input.len(),
        };
        if stop <= self.cursor {
            return false;
        }
        self.latest = Some((self.cursor, stop));
        self.cursor = stop;
        true
    }

    pub fn latest(&self) -> Option<&'a str> {
        self.latest.map(|(start, end)| &self.input[start..end])
    }

    pub fn latest_span(&self) -> Option<(usize, usize)> {
        self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn scan_advances_only_on_anchored_match() {
        let word = Regex::new(r"[a-z]+").unwrap();
        let digits = Regex::new(r"[0-9]+").unwrap();
        let mut scanner = Scanner::new("abc123");

        assert!(!scanner.scan(&digits), "digits are not at the cursor");
        assert_eq!(scanner.cursor(), 0);

        assert!(scanner.scan(&word));
        assert_eq!(scanner.latest(), Some("abc"));
        assert_eq!(scanner.cursor(), 3);

        assert!(scanner.scan(&digits));
        assert_eq!(scanner.latest(), Some("123"));
        assert!(scanner.is_empty());
    }

    #[test]
    fn scan_until_stops_before_the_delimiter() {
        let brace = Regex::new(r"\{\{").unwrap();
        let mut scanner = Scanner::new("hello {{ name }}");

        assert!(scanner.scan_until(&brace));
        assert_eq!(scanner.latest(), Some("hello "));
        assert_eq!(scanner.cursor(), 6);

        // Delimiter now sits at the cursor, so the span would be empty.
        assert!(!scanner.scan_until(&brace));
        assert_eq!(scanner.cursor(), 6);
    }

    #[test]
    fn scan_until_consumes_the_tail_when_no_delimiter_remains() {
        let brace = Regex::new(r"\{\{").unwrap();
        let mut scanner = Scanner::new("plain text");
        assert!(scanner.scan_until(&brace));
        assert_eq!(scanner.latest(), Some("plain text"));
        assert!(scanner.is_empty());
    }

    #[test]
    fn check_never_moves_the_cursor() {
        let word = Regex::new(r"[a-z]+").unwrap();
        let scanner = Scanner::new("abc");
        assert!(scanner.check(&word));
        assert_eq!(scanner.cursor(), 0);
    }
}
