use std::fmt;

use course_core::model::{AssessmentId, ChapterId, StudentId, SubjectId};
use serde::Serialize;
use services::{AppServices, Clock, EngineConfig, ErrorKind};
use storage::demo;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { command: Command, flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { command, flag } => {
                write!(f, "{} requires {flag}", command.name())
            }
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id<T: std::str::FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidId { flag, raw: value })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- seed     [--db <sqlite_url>] [--student <id>]");
    eprintln!(
        "  cargo run -p app -- compose  --student <id> --assessment <id> [--db <sqlite_url>]"
    );
    eprintln!("  cargo run -p app -- progress --student <id> [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- stage    --student <id> --chapter <id> [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- report   --subject <id> [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:dev.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  COURSE_DB_URL, RUST_LOG");
    eprintln!("  COURSE_STUDENT_VIDEO_THRESHOLD, COURSE_TEACHER_VIDEO_THRESHOLD");
    eprintln!("  COURSE_ENFORCE_DEADLINE, COURSE_DEADLINE_GRACE_SECS, COURSE_PROGRESS_LOCK");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Seed,
    Compose,
    Progress,
    Stage,
    Report,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "seed" => Some(Self::Seed),
            "compose" => Some(Self::Compose),
            "progress" => Some(Self::Progress),
            "stage" => Some(Self::Stage),
            "report" => Some(Self::Report),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Compose => "compose",
            Self::Progress => "progress",
            Self::Stage => "stage",
            Self::Report => "report",
        }
    }
}

#[derive(Debug)]
struct Args {
    db_url: String,
    student: Option<StudentId>,
    assessment: Option<AssessmentId>,
    chapter: Option<ChapterId>,
    subject: Option<SubjectId>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: std::env::var("COURSE_DB_URL")
                .ok()
                .map_or_else(
                    || normalize_sqlite_url("sqlite:dev.sqlite3".into()),
                    normalize_sqlite_url,
                ),
            student: None,
            assessment: None,
            chapter: None,
            subject: None,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--student" => parsed.student = Some(parse_id(args, "--student")?),
                "--assessment" => parsed.assessment = Some(parse_id(args, "--assessment")?),
                "--chapter" => parsed.chapter = Some(parse_id(args, "--chapter")?),
                "--subject" => parsed.subject = Some(parse_id(args, "--subject")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }
}

fn required<T>(value: Option<T>, command: Command, flag: &'static str) -> Result<T, ArgsError> {
    value.ok_or(ArgsError::MissingFlag { command, flag })
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") || raw.contains("mode=memory") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" || db_url.contains("mode=memory") {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    debug!(command = cmd.name(), db = %parsed.db_url, "starting");

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let app = AppServices::new_sqlite(&parsed.db_url, Clock::default(), EngineConfig::from_env())
        .await?;

    match cmd {
        Command::Seed => {
            let course = demo::seed(app.storage(), Clock::default().now()).await?;
            if let Some(student) = parsed.student {
                match app.enrollments().enroll(student, course.subject.id).await {
                    Ok(_) => {}
                    Err(err) if err.kind() == ErrorKind::Conflict => {}
                    Err(err) => return Err(err.into()),
                }
            }
            print_json(&course.subject)
        }
        Command::Compose => {
            let student = required(parsed.student, cmd, "--student")?;
            let assessment = required(parsed.assessment, cmd, "--assessment")?;
            print_json(&app.compose().compose(student, assessment).await?)
        }
        Command::Progress => {
            let student = required(parsed.student, cmd, "--student")?;
            print_json(&app.enrollments().my_progress(student).await?)
        }
        Command::Stage => {
            let student = required(parsed.student, cmd, "--student")?;
            let chapter = required(parsed.chapter, cmd, "--chapter")?;
            let progress = app.progress();
            let record = progress.get_progress(student, chapter).await?;
            let stage = progress.stage(student, chapter).await?;
            print_json(&serde_json::json!({
                "stage": stage,
                "progress": record,
            }))
        }
        Command::Report => {
            let subject = required(parsed.subject, cmd, "--subject")?;
            print_json(&app.enrollments().subject_report(subject).await?)
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
