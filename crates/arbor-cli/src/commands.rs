use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use colored::Colorize;

use arbor_archive::{archive_key, CheckInOptions, LabelArgs as LabelRequest, LogfileInfo, RevisionSelector};
use arbor_branch::BranchKind;
use arbor_delta::{diff_stat, unified_diff};
use arbor_server::{init_tracing, AllowAll, Dispatcher, Identity, Project, Request, Response, ServerConfig};
use arbor_types::{FileId, Timestamp};

use crate::cli::*;

const CONFIG_FILE: &str = "arbor.toml";

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    if let Command::Init(args) = &cli.command {
        return cmd_init(&cli.root, args);
    }
    let session = Session::open(&cli)?;
    match cli.command {
        Command::Init(args) => cmd_init(&cli.root, &args),
        Command::Create(args) => session.create(args),
        Command::Get(args) => session.get(args),
        Command::Checkout(args) => session.checkout(args),
        Command::Checkin(args) => session.checkin(args),
        Command::Lock(args) => session.lock(args),
        Command::Unlock(args) => session.unlock(args),
        Command::Label(args) => session.label(args),
        Command::Unlabel(args) => session.unlabel(args),
        Command::Log(args) => session.log(args),
        Command::Diff(args) => session.diff(args),
        Command::Ls(args) => session.ls(args),
        Command::Mv(args) => session.relocate(Request::Move {
            branch: session.branch.clone(),
            path: args.path,
            destination: args.destination,
        }),
        Command::Rename(args) => session.relocate(Request::Rename {
            branch: session.branch.clone(),
            path: args.path,
            new_name: args.new_name,
        }),
        Command::Rm(args) => session.relocate(Request::Delete {
            branch: session.branch.clone(),
            path: args.path,
        }),
        Command::Undelete(args) => session.relocate(Request::Undelete {
            branch: session.branch.clone(),
            file_id: FileId::new(args.file_id),
            path: args.path,
        }),
        Command::Branch(args) => session.branch(args),
        Command::Resolve(args) => session.resolve(args),
        Command::Verify(args) => session.verify(args),
    }
}

fn cmd_init(root: &Path, args: &InitArgs) -> anyhow::Result<()> {
    let path = root.join(CONFIG_FILE);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    let mut config = default_config();
    if let Some(project) = &args.project {
        config.project = project.clone();
    }
    config.default_attributes.expand_keywords = args.keywords;
    config.exclusive_locks = args.exclusive_locks;
    config.validate()?;
    std::fs::create_dir_all(root).with_context(|| format!("creating {}", root.display()))?;
    std::fs::write(&path, config.to_toml()?).with_context(|| format!("writing {}", path.display()))?;
    println!("{} Initialized arbor project {} in {}", "✓".green().bold(), config.project.bold(), root.display());
    Ok(())
}

/// Settings for a project directory without an `arbor.toml`.
fn default_config() -> ServerConfig {
    let mut config = ServerConfig {
        state_dir: Some(PathBuf::from("state")),
        ..ServerConfig::default()
    };
    config.log.level = "warn".into();
    config
}

/// Load `arbor.toml` from `root`, resolving its directories against `root`.
fn load_config(root: &Path) -> anyhow::Result<ServerConfig> {
    let path = root.join(CONFIG_FILE);
    let mut config = if path.is_file() {
        ServerConfig::load(&path).with_context(|| format!("loading {}", path.display()))?
    } else {
        default_config()
    };
    config.archive_root = root.join(&config.archive_root);
    config.state_dir = config.state_dir.map(|dir| root.join(dir));
    Ok(config)
}

struct Session {
    dispatcher: Dispatcher,
    identity: Identity,
    branch: String,
}

impl Session {
    fn open(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = load_config(&cli.root)?;
        if cli.verbose {
            config.log.level = "debug".into();
        }
        init_tracing(&config.log)?;
        let user = cli
            .user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "anonymous".into());
        let project = Project::open(config).context("opening project")?;
        tracing::debug!(root = %cli.root.display(), user = %user, branch = %cli.branch, "session opened");
        Ok(Self {
            dispatcher: Dispatcher::new(project, AllowAll),
            identity: Identity::user(user),
            branch: cli.branch.clone(),
        })
    }

    fn call(&self, request: Request) -> anyhow::Result<Response> {
        Ok(self.dispatcher.handle(&self.identity, request)?)
    }

    fn create(&self, args: CreateArgs) -> anyhow::Result<()> {
        let source = args.from.unwrap_or_else(|| PathBuf::from(&args.path));
        let content = read_file(&source)?;
        let attributes = if args.keywords || args.binary {
            let mut attributes = self.dispatcher.project().config().attributes_for_new_archive();
            attributes.expand_keywords |= args.keywords;
            attributes.binary = args.binary;
            Some(attributes)
        } else {
            None
        };
        let response = self.call(Request::Create {
            branch: self.branch.clone(),
            path: args.path.clone(),
            content,
            description: args.message,
            attributes,
        })?;
        let Response::Created { file_id, revision } = response else {
            return Err(unexpected(response));
        };
        println!(
            "{} Created {} {} (file {})",
            "✓".green().bold(),
            args.path.bold(),
            revision.to_string().yellow(),
            file_id
        );
        Ok(())
    }

    fn get(&self, args: GetArgs) -> anyhow::Result<()> {
        let selector = match (args.revision, args.label) {
            (Some(revision), _) => RevisionSelector::Revision(revision),
            (None, Some(label)) => RevisionSelector::Label(label),
            (None, None) => RevisionSelector::Default,
        };
        let (revision, content) = self.fetch(&args.path, selector)?;
        match args.output {
            Some(output) => {
                write_file(&output, &content)?;
                eprintln!("{} {} {} -> {}", "✓".green().bold(), args.path, revision.yellow(), output.display());
            }
            None => std::io::stdout().write_all(&content)?,
        }
        Ok(())
    }

    fn fetch(&self, path: &str, selector: RevisionSelector) -> anyhow::Result<(String, Vec<u8>)> {
        let response = self.call(Request::Get {
            branch: self.branch.clone(),
            path: path.into(),
            selector,
        })?;
        let Response::Content { revision, content } = response else {
            return Err(unexpected(response));
        };
        Ok((revision.to_string(), content))
    }

    fn checkout(&self, args: CheckoutArgs) -> anyhow::Result<()> {
        let response = self.call(Request::CheckOut {
            branch: self.branch.clone(),
            path: args.path.clone(),
            revision: args.revision,
            comment: args.message,
        })?;
        let Response::CheckedOut { revision, content } = response else {
            return Err(unexpected(response));
        };
        let output = args.output.unwrap_or_else(|| PathBuf::from(&args.path));
        write_file(&output, &content)?;
        println!(
            "{} Checked out {} {} (locked by {})",
            "✓".green().bold(),
            args.path.bold(),
            revision.to_string().yellow(),
            self.identity.name
        );
        Ok(())
    }

    fn checkin(&self, args: CheckinArgs) -> anyhow::Result<()> {
        let source = args.from.unwrap_or_else(|| PathBuf::from(&args.path));
        let content = read_file(&source)?;
        let locked_revision = match args.revision {
            Some(revision) => revision,
            None => self.own_lock(&args.path)?,
        };
        let options = CheckInOptions {
            force_branch: args.force_branch,
            create_new_revision_if_equal: args.force,
            label: args.label,
            float_label: args.float_label,
            retain_lock: args.keep_lock,
            ..CheckInOptions::default()
        };
        let response = self.call(Request::CheckIn {
            branch: self.branch.clone(),
            path: args.path.clone(),
            locked_revision,
            content,
            description: args.message,
            options,
        })?;
        let Response::CheckedIn { revision, created } = response else {
            return Err(unexpected(response));
        };
        if created {
            println!("{} Checked in {} {}", "✓".green().bold(), args.path.bold(), revision.to_string().yellow());
        } else {
            println!("{} unchanged at {}", args.path.bold(), revision.to_string().yellow());
        }
        Ok(())
    }

    fn lock(&self, args: RevisionArgs) -> anyhow::Result<()> {
        let response = self.call(Request::Lock {
            branch: self.branch.clone(),
            path: args.path.clone(),
            revision: args.revision,
        })?;
        let Response::Locked { revision } = response else {
            return Err(unexpected(response));
        };
        println!("{} Locked {} {}", "✓".green().bold(), args.path.bold(), revision.to_string().yellow());
        Ok(())
    }

    fn unlock(&self, args: RevisionArgs) -> anyhow::Result<()> {
        let revision = match args.revision {
            Some(revision) => revision,
            None => self.own_lock(&args.path)?,
        };
        self.call(Request::Unlock {
            branch: self.branch.clone(),
            path: args.path.clone(),
            revision: revision.clone(),
        })?;
        println!("{} Unlocked {} {}", "✓".green().bold(), args.path.bold(), revision.yellow());
        Ok(())
    }

    /// The one revision of `path` the current user holds a lock on.
    fn own_lock(&self, path: &str) -> anyhow::Result<String> {
        let info = self.report(path)?;
        let mine: Vec<_> = info
            .revisions
            .iter()
            .filter(|r| r.locked_by.as_deref() == Some(self.identity.name.as_str()))
            .map(|r| r.number.to_string())
            .collect();
        match mine.as_slice() {
            [one] => Ok(one.clone()),
            [] => bail!("{} holds no lock on {path}", self.identity.name),
            several => bail!("several locks held on {path} ({}); pass --revision", several.join(", ")),
        }
    }

    fn label(&self, args: LabelArgs) -> anyhow::Result<()> {
        let mut request = LabelRequest::new(&args.name);
        if let Some(revision) = args.revision {
            request = request.at(revision);
        }
        if args.floating {
            request = request.floating();
        }
        if args.reuse {
            request = request.reuse();
        }
        let response = self.call(Request::Label {
            branch: self.branch.clone(),
            path: args.path.clone(),
            args: request,
        })?;
        match response {
            Response::Applied(true) => println!("{} Labelled {} {}", "✓".green().bold(), args.path.bold(), args.name.cyan()),
            Response::Applied(false) => println!("{} already carries {}", args.path.bold(), args.name.cyan()),
            other => return Err(unexpected(other)),
        }
        Ok(())
    }

    fn unlabel(&self, args: UnlabelArgs) -> anyhow::Result<()> {
        let response = self.call(Request::Unlabel {
            branch: self.branch.clone(),
            path: args.path.clone(),
            label: args.name.clone(),
        })?;
        match response {
            Response::Applied(true) => println!("{} Removed {} from {}", "✓".green().bold(), args.name.cyan(), args.path.bold()),
            Response::Applied(false) => println!("{} has no label {}", args.path.bold(), args.name.cyan()),
            other => return Err(unexpected(other)),
        }
        Ok(())
    }

    fn report(&self, path: &str) -> anyhow::Result<LogfileInfo> {
        let response = self.call(Request::Report {
            branch: self.branch.clone(),
            path: path.into(),
        })?;
        let Response::Report(info) = response else {
            return Err(unexpected(response));
        };
        Ok(*info)
    }

    fn log(&self, args: LogArgs) -> anyhow::Result<()> {
        let info = self.report(&args.path)?;
        let mut revisions = info.revisions.clone();
        revisions.sort_by(|a, b| b.check_in_time.cmp(&a.check_in_time));

        if !args.oneline {
            println!("{} {} (file {})", "File:".bold(), info.short_workfile_name.bold(), info.file_id);
            println!("  Owner: {}  Default: {}", info.owner, info.default_revision.to_string().yellow());
            if !info.module_description.is_empty() {
                println!("  Description: {}", info.module_description);
            }
            if info.is_obsolete {
                println!("  {}", "obsolete".red());
            }
            for label in &info.labels {
                let target = label.revision.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".into());
                let kind = if label.floating { " (floating)" } else { "" };
                println!("  Label: {} -> {}{}", label.name.cyan(), target, kind);
            }
            println!();
        }
        for revision in revisions.iter().take(args.limit) {
            let summary = revision.description.lines().next().unwrap_or_default();
            if args.oneline {
                println!("{} {} {}", revision.number.to_string().yellow(), revision.author.dimmed(), summary);
                continue;
            }
            let lock = match &revision.locked_by {
                Some(holder) => format!("  locked by {}", holder).red().to_string(),
                None => String::new(),
            };
            println!("{}  {}  {}{}", revision.number.to_string().yellow().bold(), revision.check_in_time, revision.author, lock);
            println!("  {}", summary);
        }
        Ok(())
    }

    fn diff(&self, args: DiffArgs) -> anyhow::Result<()> {
        let (from, old) = self.fetch(&args.path, RevisionSelector::Revision(args.from))?;
        let selector = args.to.map_or(RevisionSelector::Default, RevisionSelector::Revision);
        let (to, new) = self.fetch(&args.path, selector)?;
        let labels = (format!("{} {from}", args.path), format!("{} {to}", args.path));
        let diff = match unified_diff(&old, &new, &labels.0, &labels.1) {
            None if old == new => String::new(),
            None => {
                println!("binary content differs");
                return Ok(());
            }
            Some(diff) => diff,
        };
        if diff.is_empty() {
            println!("No changes.");
            return Ok(());
        }
        for line in diff.lines() {
            if line.starts_with("+++") || line.starts_with("---") {
                println!("{}", line.bold());
            } else if line.starts_with('+') {
                println!("{}", line.green());
            } else if line.starts_with('-') {
                println!("{}", line.red());
            } else if line.starts_with("@@") {
                println!("{}", line.cyan());
            } else {
                println!("{line}");
            }
        }
        let stat = diff_stat(&old, &new);
        println!("{} insertions(+), {} deletions(-)", stat.added, stat.removed);
        Ok(())
    }

    fn ls(&self, args: LsArgs) -> anyhow::Result<()> {
        let response = self.call(Request::List {
            branch: self.branch.clone(),
            directory: args.directory,
        })?;
        let Response::Listing(contents) = response else {
            return Err(unexpected(response));
        };
        for name in contents.directories.values() {
            println!("{}/", name.blue().bold());
        }
        for (file_id, name) in &contents.files {
            println!("{}  {}", name, format!("(file {file_id})").dimmed());
        }
        Ok(())
    }

    fn relocate(&self, request: Request) -> anyhow::Result<()> {
        let kind = request.type_name();
        let response = self.call(request)?;
        let Response::Relocated { info, bookkeeping } = response else {
            return Err(unexpected(response));
        };
        let state = if info.deleted { " (in cemetery)".red().to_string() } else { String::new() };
        println!("{} {}: {} (file {}){}", "✓".green().bold(), kind, info.path.bold(), info.file_id, state);
        if bookkeeping > 0 {
            println!("  {} bookkeeping revision(s) recorded", bookkeeping);
        }
        Ok(())
    }

    fn branch(&self, args: BranchArgs) -> anyhow::Result<()> {
        let project = self.dispatcher.project();
        let registry = project.registry();
        let Some(name) = args.name else {
            for branch in registry.export()? {
                let marker = if branch.name == self.branch { "*".green().bold().to_string() } else { " ".into() };
                let parent = match branch.parent {
                    Some(id) => registry.get_by_id(id)?.name,
                    None => "-".into(),
                };
                println!("{} {}  {}  parent {}", marker, branch.name.yellow(), branch.kind, parent);
            }
            return Ok(());
        };
        let kind = match args.kind {
            BranchKindArg::Feature => BranchKind::Feature,
            BranchKindArg::Translucent => BranchKind::Translucent,
            BranchKindArg::Opaque => BranchKind::Opaque,
            BranchKindArg::DateBased => {
                let as_of = args.as_of.ok_or_else(|| anyhow!("--as-of is required for date-based branches"))?;
                BranchKind::DateBased {
                    as_of: Timestamp::parse_rfc3339(&as_of)?,
                }
            }
        };
        let branch = registry.create_branch(&name, kind, &args.parent, Timestamp::now())?;
        project.save()?;
        println!("{} Created branch {} ({}) from {}", "✓".green().bold(), branch.name.yellow(), branch.kind, args.parent);
        Ok(())
    }

    fn resolve(&self, args: PathArgs) -> anyhow::Result<()> {
        let response = self.call(Request::Resolve {
            branch: self.branch.clone(),
            path: args.path.clone(),
        })?;
        let Response::Resolved { anchor } = response else {
            return Err(unexpected(response));
        };
        println!("{} {} on {} now follows {}", "✓".green().bold(), args.path.bold(), self.branch.yellow(), anchor.to_string().yellow());
        Ok(())
    }

    fn verify(&self, args: VerifyArgs) -> anyhow::Result<()> {
        let repository = self.dispatcher.project().repository();
        let keys = if args.paths.is_empty() {
            repository.store().keys()?
        } else {
            args.paths.iter().map(|p| archive_key(p)).collect()
        };
        let mut failed = 0usize;
        for key in &keys {
            match repository.open_key(key).and_then(|file| file.verify()) {
                Ok(()) => println!("  {} {}", "ok".green(), key),
                Err(e) => {
                    failed += 1;
                    println!("  {} {}: {}", "FAILED".red().bold(), key, e);
                }
            }
        }
        if failed > 0 {
            bail!("{failed} of {} archive(s) failed verification", keys.len());
        }
        println!("{} {} archive(s) verified", "✓".green().bold(), keys.len());
        Ok(())
    }
}

fn unexpected(response: Response) -> anyhow::Error {
    anyhow!("unexpected response: {}", response.type_name())
}

fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn write_file(path: &Path, content: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))
}
