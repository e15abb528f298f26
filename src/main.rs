use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use eyre::{Result, WrapErr, bail};
use std::path::PathBuf;
use taskflow::config::{Backend, Config};
use taskflow::id::short_id;
use taskflow::{Filter, KvStore, LoadSource, NewTask, Priority, Row, StatusFilter, Task, TaskStore, date};
use tracing::Level;

#[derive(Parser)]
#[command(name = "taskflow")]
#[command(about = "taskflow - hierarchical task list with subtasks, cascading completion and search")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Config file (default: <config dir>/taskflow/config.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the stored tasks
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Storage backend: file, sqlite or memory
    #[arg(short, long)]
    backend: Option<Backend>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a root task (or a child with --parent)
    Add {
        text: String,

        /// yyyy-MM-dd or dd/MM/yyyy (default: today)
        #[arg(long, default_value = "")]
        date: String,

        #[arg(long, default_value = "")]
        subject: String,

        #[arg(long, default_value = "")]
        tag: String,

        /// high, medium or low
        #[arg(short, long, default_value = "medium")]
        priority: Priority,

        #[arg(long)]
        parent: Option<String>,
    },

    /// Add a subtask inheriting date, subject and priority from its parent
    Sub { parent: String, text: String },

    /// Delete a task and all of its subtasks
    Rm { id: String },

    /// Toggle completion on a task and its subtasks
    Done { id: String },

    /// Collapse or expand a task's subtasks in listings
    Fold { id: String },

    /// Replace a task's text
    Edit { id: String, text: String },

    /// Show the task tree
    Ls {
        /// all, completed or pending
        #[arg(short, long, default_value = "all")]
        filter: StatusFilter,

        /// Case-insensitive search over text, subject and tag
        #[arg(short, long, default_value = "")]
        search: String,

        /// Print short ids in front of each task
        #[arg(long)]
        ids: bool,
    },

    /// Show one task with its subtasks and progress
    Show { id: String },

    /// Count total, completed and pending tasks
    Stats,

    /// Load stored tasks, migrating the legacy format if needed
    Migrate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    let level = match cli.verbose {
        0 => config.log_level()?,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let persistence = config.persistence()?;
    let key = persistence.current_key().to_string();
    let mut store = TaskStore::open(persistence).wrap_err_with(|| {
        format!(
            "Could not load tasks from {} (key '{}'); stored data was left untouched",
            config.data_dir().display(),
            key
        )
    })?;

    run(&mut store, cli.command)
}

fn run<K: KvStore>(store: &mut TaskStore<K>, command: Commands) -> Result<()> {
    match command {
        Commands::Add {
            text,
            date,
            subject,
            tag,
            priority,
            parent,
        } => {
            let parent = parent.map(|p| resolve_id(store, &p)).transpose()?;
            let fields = NewTask::new(text).date(date).subject(subject).tag(tag).priority(priority);
            match store.add_task(fields, parent.as_deref())? {
                Some(task) => println!("Added {} {}", short_id(&task.id).dimmed(), task.text),
                None => println!("Nothing added (empty text or unknown parent)"),
            }
        }
        Commands::Sub { parent, text } => {
            let parent = resolve_id(store, &parent)?;
            match store.add_subtask(&parent, &text)? {
                Some(task) => println!("Added {} {}", short_id(&task.id).dimmed(), task.text),
                None => println!("Nothing added (empty text or unknown parent)"),
            }
        }
        Commands::Rm { id } => {
            let id = resolve_id(store, &id)?;
            match store.delete_task(&id)? {
                0 => println!("No task with id {}", id),
                n => println!("Deleted {} task(s)", n),
            }
        }
        Commands::Done { id } => {
            let id = resolve_id(store, &id)?;
            match store.toggle_completion(&id)? {
                Some(completed) => {
                    let cascaded = store.descendants(&id).len();
                    let state = if completed { "complete".green() } else { "pending".yellow() };
                    println!("Marked {} as {} ({} subtask(s) updated)", short_id(&id), state, cascaded);
                }
                None => println!("No task with id {}", id),
            }
        }
        Commands::Fold { id } => {
            let id = resolve_id(store, &id)?;
            match store.toggle_expanded(&id)? {
                Some(true) => println!("Expanded {}", short_id(&id)),
                Some(false) => println!("Collapsed {}", short_id(&id)),
                None => println!("No task with id {}", id),
            }
        }
        Commands::Edit { id, text } => {
            let id = resolve_id(store, &id)?;
            if store.edit_text(&id, &text)? {
                println!("Updated {}", short_id(&id));
            } else {
                println!("Nothing changed (empty text or unknown id)");
            }
        }
        Commands::Ls { filter, search, ids } => {
            let filter = Filter::new(filter, &search);
            let rows = store.render(&filter);
            if rows.is_empty() {
                println!("{}", "No tasks".dimmed());
            }
            for row in &rows {
                println!("{}", format_row(row, ids));
            }
        }
        Commands::Show { id } => {
            let id = resolve_id(store, &id)?;
            let Some(task) = store.find(&id) else {
                bail!("No task with id {}", id);
            };
            print_task(task);
            if let Some(pct) = store.completion_percentage(&id) {
                println!("  progress: {}", progress(pct));
            }
            for sub in store.descendants(&id) {
                let mark = if sub.completed { "[x]".green() } else { "[ ]".normal() };
                println!("  {} {} {}", short_id(&sub.id).dimmed(), mark, sub.text);
            }
        }
        Commands::Stats => {
            let stats = store.stats();
            println!(
                "total: {}  completed: {}  pending: {}",
                stats.total,
                stats.completed.to_string().green(),
                stats.pending.to_string().yellow()
            );
        }
        Commands::Migrate => match store.load_source() {
            LoadSource::Current => println!("Tasks already in the current format"),
            LoadSource::Migrated { count } => println!("Migrated {} legacy task(s)", count),
            LoadSource::Empty => println!("No stored tasks found"),
        },
    }

    Ok(())
}

/// Accept a full id, or a unique prefix/suffix of one
///
/// Unknown input is passed through so the store reports it as not found.
fn resolve_id<K: KvStore>(store: &TaskStore<K>, input: &str) -> Result<String> {
    if input.is_empty() || store.find(input).is_some() {
        return Ok(input.to_string());
    }

    let matches: Vec<&str> = store
        .list()
        .tasks()
        .iter()
        .map(|t| t.id.as_str())
        .filter(|id| id.starts_with(input) || id.ends_with(input))
        .collect();

    match matches.as_slice() {
        [] => Ok(input.to_string()),
        [only] => Ok(only.to_string()),
        _ => bail!("Id '{}' is ambiguous ({} tasks match)", input, matches.len()),
    }
}

fn format_row(row: &Row, show_ids: bool) -> String {
    let task = row.task;
    let indent = "  ".repeat(row.depth);
    let fold = match (row.has_visible_children, task.expanded) {
        (false, _) => " ",
        (true, true) => "▼",
        (true, false) => "▶",
    };

    let mut line = String::new();
    if show_ids {
        line.push_str(&format!("{} ", short_id(&task.id).dimmed()));
    }
    line.push_str(&format!("{}{} {} {}", indent, fold, checkbox(task), title(task)));
    if let Some(pct) = row.completion {
        line.push_str(&format!(" {}", progress(pct)));
    }
    line.push_str(&format!(" {}", meta(task)));
    line
}

fn print_task(task: &Task) {
    println!("{} {} {}", short_id(&task.id).dimmed(), checkbox(task), title(task));
    println!("  id: {}", task.id);
    println!("  {}", meta(task));
    println!("  created: {}", task.created_at.format("%Y-%m-%d %H:%M"));
}

fn checkbox(task: &Task) -> ColoredString {
    if task.completed { "[x]".green() } else { "[ ]".normal() }
}

fn title(task: &Task) -> ColoredString {
    if task.completed {
        task.text.as_str().strikethrough().dimmed()
    } else {
        task.text.as_str().bold()
    }
}

fn progress(pct: u8) -> ColoredString {
    let label = format!("{}%", pct);
    if pct == 100 { label.green() } else { label.cyan() }
}

fn meta(task: &Task) -> String {
    let priority = match task.priority {
        Priority::High => "high".red(),
        Priority::Medium => "medium".yellow(),
        Priority::Low => "low".blue(),
    };

    let mut meta = format!("{} {}", priority, date::format_display(task.date).dimmed());
    if !task.subject.is_empty() {
        meta.push_str(&format!(" {}", format!("[{}]", task.subject).cyan()));
    }
    if !task.tag.is_empty() {
        meta.push_str(&format!(" {}", format!("#{}", task.tag).magenta()));
    }
    meta
}
