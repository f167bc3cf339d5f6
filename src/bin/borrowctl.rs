use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use borrowdesk::borrow::BorrowService;
use borrowdesk::clock::{Clock, SystemClock};
use borrowdesk::config;
use borrowdesk::db;
use borrowdesk::db::lookup::SqlCatalog;
use borrowdesk::model::parse_timestamp;
use borrowdesk::notify::NotificationService;

#[derive(Debug, Parser)]
#[command(author, version, about = "Operate on borrow transactions and print the result as JSON")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Borrow one or more books for a student
    Create {
        #[arg(long)]
        student: i64,
        /// Repeat for every book in the transaction
        #[arg(long = "book", required = true)]
        books: Vec<i64>,
    },
    /// Change the status of one book in a transaction
    Update {
        transaction_id: String,
        #[arg(long)]
        book: i64,
        /// pending, borrowed or returned
        #[arg(long)]
        status: String,
        /// Return time as `YYYY-MM-DD HH:MM:SS` (UTC)
        #[arg(long, conflicts_with = "now")]
        return_date: Option<String>,
        /// Use the current time as the return time
        #[arg(long)]
        now: bool,
    },
    /// Show one transaction and its per-book rows
    Show { transaction_id: String },
    /// List a student's transactions
    Student { student_id: i64 },
    /// List every borrow of one book
    Book { book_id: i64 },
    /// List all transactions
    List,
    /// Reminders due within 24 hours for an account
    Notifications {
        #[arg(long)]
        account: i64,
    },
    /// Run the escalation sweep once and print the events without dispatching
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let catalog = Arc::new(SqlCatalog::new(pool.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let borrows = BorrowService::new(
        pool.clone(),
        catalog.clone(),
        catalog.clone(),
        clock.clone(),
        cfg.borrow.clone(),
    );
    let notifications = NotificationService::new(pool, catalog.clone(), catalog, clock.clone());

    match args.command {
        Command::Create { student, books } => print(&borrows.create(student, &books).await?),
        Command::Update {
            transaction_id,
            book,
            status,
            return_date,
            now,
        } => {
            let return_date = match (return_date, now) {
                (Some(raw), _) => Some(
                    parse_timestamp(&raw)
                        .ok_or_else(|| anyhow!("return date must be YYYY-MM-DD HH:MM:SS"))?,
                ),
                (None, true) => Some(clock.now()),
                (None, false) => None,
            };
            borrows
                .update_status(&transaction_id, book, &status, return_date)
                .await?;
            print(&borrows.records_for_transaction(&transaction_id).await?)
        }
        Command::Show { transaction_id } => {
            #[derive(Serialize)]
            struct Shown<T, R> {
                transaction: T,
                records: R,
            }
            print(&Shown {
                transaction: borrows.by_transaction_id(&transaction_id).await?,
                records: borrows.records_for_transaction(&transaction_id).await?,
            })
        }
        Command::Student { student_id } => print(&borrows.by_student_id(student_id).await?),
        Command::Book { book_id } => print(&borrows.by_book_id(book_id).await?),
        Command::List => print(&borrows.all().await?),
        Command::Notifications { account } => {
            print(&notifications.notifications_for_account(account).await?)
        }
        Command::Sweep => print(&notifications.run_escalation_sweep().await?),
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
