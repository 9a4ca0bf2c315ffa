use std::fmt;

/// Keywords recognised inside `$` delimiters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
    Author,
    Date,
    Filename,
    FilePath,
    Header,
    HeaderPath,
    Label,
    Logfile,
    Owner,
    Project,
    Revision,
    Version,
}

/// Token captured (and removed) on contraction. Never expanded.
pub const COMMENT_TOKEN: &str = "Comment";

impl Keyword {
    pub const ALL: [Keyword; 12] = [
        Keyword::Author,
        Keyword::Date,
        Keyword::Filename,
        Keyword::FilePath,
        Keyword::Header,
        Keyword::HeaderPath,
        Keyword::Label,
        Keyword::Logfile,
        Keyword::Owner,
        Keyword::Project,
        Keyword::Revision,
        Keyword::Version,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Keyword::Author => "Author",
            Keyword::Date => "Date",
            Keyword::Filename => "Filename",
            Keyword::FilePath => "FilePath",
            Keyword::Header => "Header",
            Keyword::HeaderPath => "HeaderPath",
            Keyword::Label => "Label",
            Keyword::Logfile => "Logfile",
            Keyword::Owner => "Owner",
            Keyword::Project => "Project",
            Keyword::Revision => "Revision",
            Keyword::Version => "Version",
        }
    }

    /// Case-sensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Keyword> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A `$Name$` or `$Name: value$` token found in content.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Token<'a> {
    pub name: &'a str,
    /// Text between `:` and the closing `$`; `None` for the bare form.
    pub value: Option<&'a [u8]>,
    /// One past the closing `$`.
    pub end: usize,
}

/// Parse a token starting at the `$` at `start`.
///
/// The name is a run of ASCII letters. An expanded value may not span a
/// line.
pub(crate) fn token_at(input: &[u8], start: usize) -> Option<Token<'_>> {
    let name_start = start + 1;
    let name_len = input
        .get(name_start..)?
        .iter()
        .take_while(|b| b.is_ascii_alphabetic())
        .count();
    if name_len == 0 {
        return None;
    }
    let name_end = name_start + name_len;
    let name = std::str::from_utf8(&input[name_start..name_end]).ok()?;
    match *input.get(name_end)? {
        b'$' => Some(Token {
            name,
            value: None,
            end: name_end + 1,
        }),
        b':' => {
            let rest = &input[name_end + 1..];
            let close = rest.iter().position(|&b| matches!(b, b'$' | b'\n' | b'\r'))?;
            if rest[close] != b'$' {
                return None;
            }
            Some(Token {
                name,
                value: Some(&rest[..close]),
                end: name_end + 1 + close + 1,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kw in Keyword::ALL {
            assert_eq!(Keyword::from_name(kw.name()), Some(kw));
        }
        assert_eq!(Keyword::from_name("revision"), None);
        assert_eq!(Keyword::from_name(COMMENT_TOKEN), None);
    }

    #[test]
    fn bare_token() {
        let tok = token_at(b"x $Revision$ y", 2).unwrap();
        assert_eq!(tok.name, "Revision");
        assert_eq!(tok.value, None);
        assert_eq!(tok.end, 12);
    }

    #[test]
    fn expanded_token() {
        let input = b"$Author: bob $!";
        let tok = token_at(input, 0).unwrap();
        assert_eq!(tok.name, "Author");
        assert_eq!(tok.value, Some(&b" bob "[..]));
        assert_eq!(tok.end, input.len() - 1);
    }

    #[test]
    fn non_tokens() {
        assert_eq!(token_at(b"$", 0), None);
        assert_eq!(token_at(b"$$", 0), None);
        assert_eq!(token_at(b"$ Revision$", 0), None);
        assert_eq!(token_at(b"$Revision", 0), None);
        assert_eq!(token_at(b"$Revision: open\n$", 0), None);
        assert_eq!(token_at(b"$Rev1$", 0), None);
    }
}
