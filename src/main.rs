use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use fee_reminder::application::dispatcher::DispatchReport;
use fee_reminder::application::engine::FeeEngine;
use fee_reminder::config::AppConfig;
use fee_reminder::domain::directory::PaymentId;
use fee_reminder::domain::notification::ActionToken;
use fee_reminder::domain::payment::{BillingMonth, Payment};
use fee_reminder::domain::ports::{DirectoryStoreRef, PaymentStoreRef, TransportRef};
use fee_reminder::error::PaymentError;
use fee_reminder::infrastructure::in_memory::{InMemoryDirectoryStore, InMemoryPaymentStore};
#[cfg(feature = "storage-rocksdb")]
use fee_reminder::infrastructure::rocksdb::RocksDBStore;
use fee_reminder::infrastructure::outbox::OutboxTransport;
use fee_reminder::interfaces::csv::directory_reader::DirectoryReader;
use fee_reminder::interfaces::csv::report_writer::{ParentRecord, PaymentRecord, ReportWriter};
use fee_reminder::interfaces::enrollment::{EnrollmentSessions, EnrollmentStep};
use fee_reminder::interfaces::import::DirectoryImporter;
use miette::{IntoDiagnostic, Result, bail};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// TOML configuration file. Defaults to config/default.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Grade price list (school,grade,monthly_payment) to import first.
    #[arg(long, global = true)]
    grades: Option<PathBuf>,

    /// Parent list to import first.
    #[arg(long, global = true)]
    parents: Option<PathBuf>,

    /// Append outgoing reminders to this file. Without it reminders go to
    /// stdout as JSON lines; dispatch summaries always go to stderr.
    #[arg(long, global = true)]
    outbox: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the default schools with grades 1 to 8
    Init,
    /// Create payments for a billing month (default: next month)
    Generate {
        #[arg(long)]
        month: Option<BillingMonth>,
    },
    /// Remind parents whose payments fall inside the reminder window
    Remind {
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Remind every parent with a chat address about an unpaid payment
    ForceAll,
    /// Record a payment as paid
    MarkPaid {
        id: u64,
        /// Payment time (RFC 3339). Defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Record that the receipt for a paid payment was sent
    ReceiptSent { id: u64 },
    /// Apply a reminder reply such as `payment_12` or `receipt_12`
    Confirm { token: ActionToken },
    /// Paid payments as CSV, newest month first
    Paid,
    /// Unpaid payments as CSV (default: current month)
    Unpaid {
        #[arg(long)]
        month: Option<BillingMonth>,
        /// Every unpaid payment regardless of month
        #[arg(long, conflicts_with = "month")]
        all: bool,
    },
    /// Payment statistics for a month (default: current month)
    Stats {
        #[arg(long)]
        month: Option<BillingMonth>,
    },
    /// Add a parent interactively
    AddParent,
    /// Active parents as CSV with school, grade, fee and phone
    Parents,
}

const CLI_ADMIN: &str = "cli";

fn open_stores(db_path: Option<PathBuf>) -> Result<(DirectoryStoreRef, PaymentStoreRef)> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            // Use persistent storage (RocksDB)
            let store = Arc::new(RocksDBStore::open(path)?);
            let directory: DirectoryStoreRef = store.clone();
            let payments: PaymentStoreRef = store;
            Ok((directory, payments))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            tracing::warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
            );
            Ok(in_memory_stores())
        }
        None => Ok(in_memory_stores()),
    }
}

fn in_memory_stores() -> (DirectoryStoreRef, PaymentStoreRef) {
    let directory: DirectoryStoreRef = Arc::new(InMemoryDirectoryStore::new());
    let payments: PaymentStoreRef = Arc::new(InMemoryPaymentStore::new());
    (directory, payments)
}

fn open_transport(outbox: Option<PathBuf>) -> Result<TransportRef> {
    let writer: Box<dyn Write + Send> = match outbox {
        Some(path) => Box::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .into_diagnostic()?,
        ),
        None => Box::new(io::stdout()),
    };
    Ok(Arc::new(OutboxTransport::new(writer)))
}

async fn import_directory(
    directory: &DirectoryStoreRef,
    grades: Option<PathBuf>,
    parents: Option<PathBuf>,
) -> Result<()> {
    if grades.is_none() && parents.is_none() {
        return Ok(());
    }
    let mut importer = DirectoryImporter::new(directory.as_ref()).await?;
    if let Some(path) = grades {
        let file = File::open(path).into_diagnostic()?;
        importer
            .import_grades(DirectoryReader::new(file).grades())
            .await;
    }
    if let Some(path) = parents {
        let file = File::open(path).into_diagnostic()?;
        importer
            .import_parents(DirectoryReader::new(file).parents())
            .await;
    }
    let summary = importer.summary();
    info!(
        schools = summary.schools,
        grades = summary.grades,
        parents = summary.parents,
        "Directory imported"
    );
    Ok(())
}

fn print_report(label: &str, report: &DispatchReport) {
    eprintln!(
        "{}: {} delivered, {} failed, {} skipped",
        label,
        report.delivered,
        report.failed(),
        report.skipped
    );
}

async fn write_payments(engine: &FeeEngine, payments: &[Payment]) -> Result<()> {
    let mut records = Vec::with_capacity(payments.len());
    for payment in payments {
        records.push(PaymentRecord::describe(engine.directory().as_ref(), payment).await?);
    }
    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    writer.write_records(records)?;
    Ok(())
}

async fn write_parents(engine: &FeeEngine) -> Result<()> {
    let directory = engine.directory();
    let parents = directory.find_active_parents().await?;
    let mut records = Vec::with_capacity(parents.len());
    for parent in &parents {
        records.push(ParentRecord::describe(directory.as_ref(), parent).await?);
    }
    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    writer.write_records(records)?;
    Ok(())
}

fn pick<'a, T>(items: &'a [T], input: &str) -> std::result::Result<&'a T, PaymentError> {
    input
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| items.get(i))
        .ok_or_else(|| {
            PaymentError::ValidationError(format!("Enter a number from 1 to {}", items.len()))
        })
}

async fn add_parent(engine: &FeeEngine) -> Result<()> {
    let directory = engine.directory();
    let schools = directory.find_schools().await?;
    if schools.is_empty() {
        bail!("No schools yet: run `init` or import a grade list first");
    }

    let mut sessions = EnrollmentSessions::new();
    let flow = sessions.start(CLI_ADMIN);
    let mut grades = Vec::new();
    let mut lines = io::stdin().lock().lines();

    while flow.step() != EnrollmentStep::Complete {
        let step = flow.step();
        match step {
            EnrollmentStep::AwaitingSchool => {
                for (i, school) in schools.iter().enumerate() {
                    println!("{}. {}", i + 1, school.name);
                }
            }
            EnrollmentStep::AwaitingGrade => {
                if let Some(school_id) = flow.school_id() {
                    grades = directory.find_grades(school_id).await?;
                }
                for (i, grade) in grades.iter().enumerate() {
                    println!("{}. {} ({} руб./мес)", i + 1, grade.name, grade.monthly_payment);
                }
            }
            _ => {}
        }
        println!("{}", step.prompt());

        let Some(line) = lines.next() else {
            bail!("Input ended before the parent was complete");
        };
        let line = line.into_diagnostic()?;
        if line.trim() == "/cancel" {
            sessions.cancel(&CLI_ADMIN);
            println!("Cancelled.");
            return Ok(());
        }

        let result = match step {
            EnrollmentStep::AwaitingSchool => pick(&schools, &line).and_then(|s| flow.choose_school(s)),
            EnrollmentStep::AwaitingGrade => pick(&grades, &line).and_then(|g| flow.choose_grade(g)),
            _ => flow.submit_text(&line),
        };
        if let Err(e) = result {
            println!("{}", e);
        }
    }

    let parent = directory.insert_parent(sessions.complete(&CLI_ADMIN)?).await?;
    println!(
        "Parent {} added: {} ({})",
        parent.id,
        parent.display_name(),
        parent.child_name
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fee_reminder=info")),
        )
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    let (directory, payments) = open_stores(cli.db_path)?;
    import_directory(&directory, cli.grades, cli.parents).await?;

    let engine = FeeEngine::new(
        directory.clone(),
        payments,
        open_transport(cli.outbox)?,
        config,
    );
    let today = Local::now().date_naive();

    match cli.command {
        Command::Init => {
            let mut importer = DirectoryImporter::new(directory.as_ref()).await?;
            importer.seed_default_catalogue().await?;
            let summary = importer.summary();
            println!(
                "Created {} schools and {} grades",
                summary.schools, summary.grades
            );
        }
        Command::Generate { month } => {
            let month = month.unwrap_or_else(|| BillingMonth::containing(today + Days::new(32)));
            let created = engine.generate_monthly_payments(&month).await?;
            println!("Created {} payments for {}", created, month);
        }
        Command::Remind { today: on } => {
            let report = engine.send_reminders(on.unwrap_or(today)).await?;
            print_report("Reminders", &report);
        }
        Command::ForceAll => {
            let report = engine.dispatch_to_all_recipients().await?;
            print_report("Forced reminders", &report);
        }
        Command::MarkPaid { id, at } => {
            let payment = engine
                .mark_paid(PaymentId(id), at.unwrap_or_else(Utc::now))
                .await?;
            if let Some(date) = payment.payment_date() {
                println!("Payment {} paid at {}", payment.id(), date.to_rfc3339());
            }
        }
        Command::ReceiptSent { id } => {
            let payment = engine.mark_receipt_sent(PaymentId(id)).await?;
            println!("Receipt recorded for payment {}", payment.id());
        }
        Command::Confirm { token } => {
            let payment = engine.confirm(&token, Utc::now()).await?;
            println!("Payment {} is now {:?}", payment.id(), payment.status());
        }
        Command::Paid => {
            let paid: Vec<Payment> = engine
                .list_paid()
                .await?
                .into_iter()
                .flat_map(|group| group.payments)
                .collect();
            write_payments(&engine, &paid).await?;
        }
        Command::Unpaid { month, all } => {
            let filter = (!all).then(|| month.unwrap_or_else(|| BillingMonth::containing(today)));
            let unpaid = engine.list_unpaid(filter).await?;
            write_payments(&engine, &unpaid).await?;
        }
        Command::Stats { month } => {
            let month = month.unwrap_or_else(|| BillingMonth::containing(today));
            let s = engine.summary(month).await?;
            println!("Schools: {}", s.schools);
            println!("Active parents: {}", s.active_parents);
            println!("Unpaid payments: {}", s.unpaid_total);
            println!("{}: {} paid, {} unpaid", month, s.paid_in_month, s.unpaid_in_month);
            println!("Paid overall: {} ({} with receipt)", s.paid_total, s.paid_with_receipt);
        }
        Command::AddParent => add_parent(&engine).await?,
        Command::Parents => write_parents(&engine).await?,
    }

    Ok(())
}
