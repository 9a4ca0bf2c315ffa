//! Keyword expansion for arbor.
//!
//! Text revisions may carry RCS-style keywords such as `$Revision$` or
//! `$Author$`. On retrieval the server stamps the revision's metadata into
//! them (`$Revision: 1.4 $`); on check-in it strips the values again so the
//! archive only ever stores the contracted form. Contraction also captures
//! embedded `$Comment: ... $` text for use as a check-in description.
//!
//! # Key Types
//!
//! - [`KeywordExpander`] -- expand/contract transform, bypassed for binary files
//! - [`ExpansionContext`] -- revision metadata supplying keyword values
//! - [`Keyword`] -- the recognised keyword set
//! - [`Contracted`] -- contracted content plus captured comment text

pub mod context;
pub mod error;
pub mod expander;
pub mod keyword;

pub use context::{ExpansionContext, DATE_FORMAT, NO_LABEL};
pub use error::{KeywordError, KeywordResult};
pub use expander::{Contracted, KeywordExpander, COMMENT_SEPARATOR};
pub use keyword::{Keyword, COMMENT_TOKEN};
