use std::io::Write;

use tracing::debug;

use crate::context::ExpansionContext;
use crate::error::KeywordResult;
use crate::keyword::{token_at, Keyword, COMMENT_TOKEN};

/// Separator between comment texts captured from one file.
pub const COMMENT_SEPARATOR: &str = "; ";

/// Result of contracting content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Contracted {
    pub content: Vec<u8>,
    /// Texts of embedded `$Comment: ... $` tokens, joined with
    /// [`COMMENT_SEPARATOR`]. `None` if there were none.
    pub comment: Option<String>,
}

/// Stamps revision metadata into content and strips it out again.
///
/// Expansion rewrites every recognised `$Keyword$` or `$Keyword: ... $`
/// into `$Keyword: value $`; contraction turns the expanded form back into
/// `$Keyword$`. A `$` that does not open a recognised token is copied
/// through untouched. Binary content bypasses both directions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeywordExpander {
    binary: bool,
}

/// Values may not contain the delimiter or a line break, or the expanded
/// token could not be contracted again.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '$' => '_',
            '\n' | '\r' => ' ',
            c => c,
        })
        .collect()
}

impl KeywordExpander {
    pub fn new(binary: bool) -> Self {
        Self { binary }
    }

    pub fn text() -> Self {
        Self::new(false)
    }

    pub fn binary() -> Self {
        Self::new(true)
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Expand keywords in `input`, writing the result to `out`.
    pub fn expand_into<W: Write>(&self, input: &[u8], ctx: &ExpansionContext, out: &mut W) -> KeywordResult<()> {
        out.write_all(&self.expand(input, ctx))?;
        Ok(())
    }

    /// Expand keywords in `input`.
    pub fn expand(&self, input: &[u8], ctx: &ExpansionContext) -> Vec<u8> {
        if self.binary {
            return input.to_vec();
        }

        let mut out = Vec::with_capacity(input.len());
        let mut expanded = 0usize;
        let mut literal_start = 0;
        let mut pos = 0;
        while let Some(offset) = input[pos..].iter().position(|&b| b == b'$') {
            let start = pos + offset;
            let found = token_at(input, start).and_then(|t| Keyword::from_name(t.name).map(|k| (k, t.end)));
            match found {
                Some((keyword, end)) => {
                    out.extend_from_slice(&input[literal_start..start]);
                    let value = format!("${}: {} $", keyword.name(), sanitize(&ctx.value(keyword)));
                    out.extend_from_slice(value.as_bytes());
                    expanded += 1;
                    pos = end;
                    literal_start = end;
                }
                None => pos = start + 1,
            }
        }
        out.extend_from_slice(&input[literal_start..]);

        if expanded > 0 {
            debug!(revision = %ctx.revision, expanded, "keywords expanded");
        }
        out
    }

    /// Contract expanded keywords and capture embedded comments.
    pub fn contract(&self, input: &[u8]) -> Contracted {
        if self.binary {
            return Contracted {
                content: input.to_vec(),
                comment: None,
            };
        }

        let mut content = Vec::with_capacity(input.len());
        let mut comments: Vec<String> = Vec::new();
        let mut literal_start = 0;
        let mut pos = 0;
        while let Some(offset) = input[pos..].iter().position(|&b| b == b'$') {
            let start = pos + offset;
            let Some(token) = token_at(input, start) else {
                pos = start + 1;
                continue;
            };
            let Some(value) = token.value else {
                pos = start + 1;
                continue;
            };
            if token.name == COMMENT_TOKEN {
                content.extend_from_slice(&input[literal_start..start]);
                let text = String::from_utf8_lossy(value).trim().to_string();
                if !text.is_empty() {
                    comments.push(text);
                }
            } else if let Some(keyword) = Keyword::from_name(token.name) {
                content.extend_from_slice(&input[literal_start..start]);
                content.push(b'$');
                content.extend_from_slice(keyword.name().as_bytes());
                content.push(b'$');
            } else {
                pos = start + 1;
                continue;
            }
            pos = token.end;
            literal_start = token.end;
        }
        content.extend_from_slice(&input[literal_start..]);

        let comment = (!comments.is_empty()).then(|| comments.join(COMMENT_SEPARATOR));
        if let Some(text) = &comment {
            debug!(len = text.len(), "embedded comment captured");
        }
        Contracted { content, comment }
    }
}
