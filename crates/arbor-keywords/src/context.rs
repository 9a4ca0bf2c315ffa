use arbor_types::Timestamp;

use crate::keyword::Keyword;

/// strftime pattern of the `Date` keyword, e.g. `Saturday, June 07, 2008 9:26:33 PM`.
pub const DATE_FORMAT: &str = "%A, %B %d, %Y %-I:%M:%S %p";

/// Value of the `Label` keyword when the revision carries no label.
pub const NO_LABEL: &str = "NONE";

/// Metadata stamped into content by expansion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpansionContext {
    /// Dotted revision string.
    pub revision: String,
    /// Author of the revision.
    pub author: String,
    pub check_in_time: Timestamp,
    /// Archive owner.
    pub owner: String,
    /// Short workfile name.
    pub filename: String,
    /// Project-relative directory of the workfile, `""` for the root.
    pub directory: String,
    /// Label to report. Falls back to [`NO_LABEL`].
    pub label: Option<String>,
    pub project: String,
    /// Storage key of the archive.
    pub logfile: String,
}

impl ExpansionContext {
    pub fn new(revision: impl Into<String>, author: impl Into<String>, check_in_time: Timestamp) -> Self {
        Self {
            revision: revision.into(),
            author: author.into(),
            check_in_time,
            ..Self::default()
        }
    }

    pub fn with_file(mut self, directory: impl Into<String>, filename: impl Into<String>) -> Self {
        self.directory = directory.into();
        self.filename = filename.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    pub fn with_logfile(mut self, logfile: impl Into<String>) -> Self {
        self.logfile = logfile.into();
        self
    }

    /// Directory plus filename.
    pub fn file_path(&self) -> String {
        if self.directory.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", self.directory.trim_end_matches('/'), self.filename)
        }
    }

    pub fn formatted_date(&self) -> String {
        self.check_in_time.to_datetime().format(DATE_FORMAT).to_string()
    }

    fn header_tail(&self) -> String {
        format!("Revision: {} {} {}", self.revision, self.formatted_date(), self.author)
    }

    /// Raw value of `keyword`, before sanitising.
    pub fn value(&self, keyword: Keyword) -> String {
        match keyword {
            Keyword::Author => self.author.clone(),
            Keyword::Date => self.formatted_date(),
            Keyword::Filename => self.filename.clone(),
            Keyword::FilePath => self.file_path(),
            Keyword::Header => format!("{} {}", self.filename, self.header_tail()),
            Keyword::HeaderPath => format!("{} {}", self.file_path(), self.header_tail()),
            Keyword::Label => self.label.clone().unwrap_or_else(|| NO_LABEL.to_string()),
            Keyword::Logfile => self.logfile.clone(),
            Keyword::Owner => self.owner.clone(),
            Keyword::Project => self.project.clone(),
            Keyword::Revision | Keyword::Version => self.revision.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample() -> ExpansionContext {
        let at = Utc.with_ymd_and_hms(2008, 6, 7, 21, 26, 33).unwrap();
        ExpansionContext::new("1.91", "JimVoris", Timestamp::from(at))
            .with_file("test/expand", "Server.java")
    }

    #[test]
    fn date_matches_long_form() {
        assert_eq!(sample().value(Keyword::Date), "Saturday, June 07, 2008 9:26:33 PM");
    }

    #[test]
    fn header_values() {
        let ctx = sample();
        assert_eq!(
            ctx.value(Keyword::Header),
            "Server.java Revision: 1.91 Saturday, June 07, 2008 9:26:33 PM JimVoris"
        );
        assert_eq!(
            ctx.value(Keyword::HeaderPath),
            "test/expand/Server.java Revision: 1.91 Saturday, June 07, 2008 9:26:33 PM JimVoris"
        );
    }

    #[test]
    fn label_defaults_to_none() {
        assert_eq!(sample().value(Keyword::Label), NO_LABEL);
        assert_eq!(sample().with_label("REL_1").value(Keyword::Label), "REL_1");
    }

    #[test]
    fn file_path_at_root() {
        let ctx = ExpansionContext::new("1.1", "a", Timestamp::from_millis(0)).with_file("", "x.c");
        assert_eq!(ctx.file_path(), "x.c");
    }
}
