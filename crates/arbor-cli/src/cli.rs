use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "arbor", about = "arbor -- branching revision archives", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Project directory holding archives, state and arbor.toml
    #[arg(long, global = true, default_value = ".arbor")]
    pub root: PathBuf,

    /// Branch to operate on
    #[arg(short, long, global = true, default_value = "Trunk")]
    pub branch: String,

    /// User name recorded on locks and revisions (defaults to $USER)
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a project directory with a default arbor.toml
    Init(InitArgs),
    /// Put a new file under version control
    Create(CreateArgs),
    /// Print or write a revision
    Get(GetArgs),
    /// Lock a revision and write it out for editing
    Checkout(CheckoutArgs),
    /// Check in a new revision of a locked file
    Checkin(CheckinArgs),
    /// Lock a revision
    Lock(RevisionArgs),
    /// Release your lock on a revision
    Unlock(RevisionArgs),
    /// Label a revision
    Label(LabelArgs),
    /// Remove a label
    Unlabel(UnlabelArgs),
    /// Show revision history
    Log(LogArgs),
    /// Show changes between two revisions
    Diff(DiffArgs),
    /// List a directory
    Ls(LsArgs),
    /// Move a file to another directory
    Mv(MoveArgs),
    /// Rename a file in place
    Rename(RenameArgs),
    /// Delete a file (it can be undeleted)
    Rm(PathArgs),
    /// Bring a deleted file back
    Undelete(UndeleteArgs),
    /// List or create branches
    Branch(BranchArgs),
    /// Re-anchor the current branch at its parent's tip
    Resolve(PathArgs),
    /// Check stored archives for corruption
    Verify(VerifyArgs),
}

#[derive(Args)]
pub struct InitArgs {
    #[arg(long)]
    pub project: Option<String>,
    /// Expand keywords in new files by default
    #[arg(long)]
    pub keywords: bool,
    /// Allow at most one lock per archive
    #[arg(long)]
    pub exclusive_locks: bool,
}

#[derive(Args)]
pub struct CreateArgs {
    /// Project path of the new file
    pub path: String,
    /// Read the initial content from this file instead of `path`
    #[arg(long)]
    pub from: Option<PathBuf>,
    #[arg(short, long)]
    pub message: Option<String>,
    #[arg(long)]
    pub keywords: bool,
    #[arg(long)]
    pub binary: bool,
}

#[derive(Args)]
pub struct GetArgs {
    pub path: String,
    #[arg(short, long, conflicts_with = "label")]
    pub revision: Option<String>,
    #[arg(short, long)]
    pub label: Option<String>,
    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct CheckoutArgs {
    pub path: String,
    #[arg(short, long)]
    pub revision: Option<String>,
    #[arg(short, long, default_value = "")]
    pub message: String,
    /// Write to this file instead of `path`
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct CheckinArgs {
    pub path: String,
    /// Read the new content from this file instead of `path`
    #[arg(long)]
    pub from: Option<PathBuf>,
    #[arg(short, long, default_value = "")]
    pub message: String,
    /// Locked revision to check in against (defaults to your lock)
    #[arg(short, long)]
    pub revision: Option<String>,
    #[arg(long)]
    pub keep_lock: bool,
    #[arg(long)]
    pub label: Option<String>,
    #[arg(long, requires = "label")]
    pub float_label: bool,
    #[arg(long)]
    pub force_branch: bool,
    /// Create a revision even when nothing changed
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct RevisionArgs {
    pub path: String,
    #[arg(short, long)]
    pub revision: Option<String>,
}

#[derive(Args)]
pub struct LabelArgs {
    pub path: String,
    pub name: String,
    #[arg(short, long)]
    pub revision: Option<String>,
    #[arg(long)]
    pub floating: bool,
    /// Move the label if it already exists
    #[arg(long)]
    pub reuse: bool,
}

#[derive(Args)]
pub struct UnlabelArgs {
    pub path: String,
    pub name: String,
}

#[derive(Args)]
pub struct LogArgs {
    pub path: String,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    #[arg(long)]
    pub oneline: bool,
}

#[derive(Args)]
pub struct DiffArgs {
    pub path: String,
    pub from: String,
    /// Defaults to the branch tip
    pub to: Option<String>,
}

#[derive(Args)]
pub struct LsArgs {
    #[arg(default_value = "")]
    pub directory: String,
}

#[derive(Args)]
pub struct MoveArgs {
    pub path: String,
    pub destination: String,
}

#[derive(Args)]
pub struct RenameArgs {
    pub path: String,
    pub new_name: String,
}

#[derive(Args)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Args)]
pub struct UndeleteArgs {
    pub file_id: u32,
    pub path: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BranchKindArg {
    Feature,
    Translucent,
    Opaque,
    DateBased,
}

#[derive(Args)]
pub struct BranchArgs {
    /// Create this branch; list branches when omitted
    pub name: Option<String>,
    #[arg(long, value_enum, default_value = "feature")]
    pub kind: BranchKindArg,
    #[arg(long, default_value = "Trunk")]
    pub parent: String,
    /// RFC 3339 date a date-based branch is frozen at
    #[arg(long, required_if_eq("kind", "date-based"))]
    pub as_of: Option<String>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Archive paths to check; every stored archive when empty
    pub paths: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults() {
        let cli = Cli::try_parse_from(["arbor", "get", "src/a.c"]).unwrap();
        assert_eq!(cli.branch, "Trunk");
        assert_eq!(cli.root, PathBuf::from(".arbor"));
        if let Command::Get(args) = cli.command {
            assert_eq!(args.path, "src/a.c");
            assert!(args.revision.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["arbor", "lock", "a.c", "-r", "1.2", "-b", "dev", "-u", "bob"]).unwrap();
        assert_eq!(cli.branch, "dev");
        assert_eq!(cli.user.as_deref(), Some("bob"));
        if let Command::Lock(args) = cli.command {
            assert_eq!(args.revision.as_deref(), Some("1.2"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_checkin() {
        let cli = Cli::try_parse_from(["arbor", "checkin", "a.c", "-m", "fix", "--label", "REL", "--keep-lock"]).unwrap();
        if let Command::Checkin(args) = cli.command {
            assert_eq!(args.message, "fix");
            assert_eq!(args.label.as_deref(), Some("REL"));
            assert!(args.keep_lock);
            assert!(!args.force_branch);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn float_label_needs_label() {
        assert!(Cli::try_parse_from(["arbor", "checkin", "a.c", "--float-label"]).is_err());
    }

    #[test]
    fn get_revision_and_label_conflict() {
        assert!(Cli::try_parse_from(["arbor", "get", "a.c", "-r", "1.1", "-l", "L"]).is_err());
    }

    #[test]
    fn parse_branch_create() {
        let cli = Cli::try_parse_from(["arbor", "branch", "dev", "--kind", "opaque"]).unwrap();
        if let Command::Branch(args) = cli.command {
            assert_eq!(args.name.as_deref(), Some("dev"));
            assert_eq!(args.kind, BranchKindArg::Opaque);
            assert_eq!(args.parent, "Trunk");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn date_based_branch_needs_date() {
        assert!(Cli::try_parse_from(["arbor", "branch", "snap", "--kind", "date-based"]).is_err());
        assert!(Cli::try_parse_from([
            "arbor", "branch", "snap", "--kind", "date-based", "--as-of", "2024-01-01T00:00:00Z",
        ])
        .is_ok());
    }

    #[test]
    fn parse_undelete() {
        let cli = Cli::try_parse_from(["arbor", "undelete", "7", "docs/a.txt"]).unwrap();
        if let Command::Undelete(args) = cli.command {
            assert_eq!(args.file_id, 7);
            assert_eq!(args.path, "docs/a.txt");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_verify_all() {
        let cli = Cli::try_parse_from(["arbor", "verify"]).unwrap();
        if let Command::Verify(args) = cli.command {
            assert!(args.paths.is_empty());
        } else { panic!("wrong command"); }
    }
}
