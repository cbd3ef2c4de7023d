//! Command-line entry point for the profit ledger.
//!
//! # Responsibility
//! - Resolve configuration from flags and environment variables.
//! - Run exactly one ledger interaction per invocation and print the result.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::error;
use profit_ledger_core::{
    default_log_level, init_logging, open_db, Amount, EditOutcome, LedgerService,
    MembershipChange, MonthSummary, PlanStatus, SqliteLedgerStore,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "profit-ledger", version)]
#[command(about = "Track daily profits and monthly plans per employee", long_about = None)]
struct Cli {
    /// Ledger database file.
    #[arg(long, env = "PROFIT_LEDGER_DB", default_value = "profit_ledger.db")]
    db: PathBuf,

    /// Directory for rolling log files; logging is off when unset.
    #[arg(long, env = "PROFIT_LEDGER_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "PROFIT_LEDGER_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List months chronologically.
    Months,
    /// Create the month after the latest one.
    AddMonth,
    /// Add an employee to a month and every later month.
    AddEmployee { month: String, name: String },
    /// Remove an employee from a month and every later month.
    RemoveEmployee { month: String, name: String },
    /// Change an employee's display name.
    RenameEmployee { current: String, new: String },
    /// Set one day's profit (date as YYYY-MM-DD).
    SetProfit {
        month: String,
        name: String,
        date: NaiveDate,
        amount: Amount,
    },
    /// Set an employee's monthly plan.
    SetPlan {
        month: String,
        name: String,
        amount: Amount,
    },
    /// Print weekly totals and plan progress of a month.
    Summary { month: String },
    /// List payloads that could not be read.
    Quarantine,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = setup_logging(&cli) {
        eprintln!("warning: {err}");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(cli: &Cli) -> Result<(), String> {
    let Some(log_dir) = &cli.log_dir else {
        return Ok(());
    };
    let log_dir = if log_dir.is_absolute() {
        log_dir.clone()
    } else {
        std::env::current_dir()
            .map_err(|err| format!("cannot resolve log directory: {err}"))?
            .join(log_dir)
    };
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    init_logging(level, &log_dir.to_string_lossy())
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut conn = open_db(&cli.db)?;
    let store = SqliteLedgerStore::try_new(&mut conn)?;
    let service = LedgerService::new(store);

    if let Some(created) = service.ensure_current_month()? {
        println!("created {created}");
    }

    match cli.command {
        Commands::Months => {
            for key in service.months()? {
                println!("{key}");
            }
        }
        Commands::AddMonth => println!("created {}", service.add_next_month()?),
        Commands::AddEmployee { month, name } => {
            print_change("added", &name, &service.add_employee(&month, &name)?)
        }
        Commands::RemoveEmployee { month, name } => {
            print_change("removed", &name, &service.remove_employee(&month, &name)?)
        }
        Commands::RenameEmployee { current, new } => {
            service.rename_employee(&current, &new)?;
            println!("renamed {current} to {new}");
        }
        Commands::SetProfit {
            month,
            name,
            date,
            amount,
        } => print_edit(&service.set_daily_profit(&month, &name, date, amount)?),
        Commands::SetPlan {
            month,
            name,
            amount,
        } => print_edit(&service.set_plan(&month, &name, amount)?),
        Commands::Summary { month } => match service.summary(&month)? {
            Some(summary) => print_summary(&summary),
            None => return Err(format!("month not found: `{month}`").into()),
        },
        Commands::Quarantine => {
            for record in service.quarantined()? {
                println!("#{} at {} ms: {}", record.id, record.quarantined_at, record.reason);
                println!("{}", record.payload);
            }
        }
    }
    Ok(())
}

fn print_change(verb: &str, name: &str, change: &MembershipChange) {
    if change.is_noop() {
        println!("nothing to change for {name}");
    } else {
        println!("{verb} {name} in {}", change.affected_months.join(", "));
    }
}

fn print_edit(outcome: &EditOutcome) {
    match outcome {
        EditOutcome::Applied => println!("saved"),
        EditOutcome::Skipped(reason) => println!("skipped: {reason}"),
    }
}

fn print_summary(summary: &MonthSummary) {
    println!("{}", summary.month_key);
    for (index, week) in summary.weeks.iter().enumerate() {
        println!("  week {} {}  {}", index + 1, week.label, week.total);
    }
    for row in &summary.employees {
        let progress = row
            .progress
            .percent()
            .map(|percent| format!("{percent:.1}%"))
            .unwrap_or_else(|| "-".to_string());
        let status = match row.status {
            PlanStatus::Met => "met",
            PlanStatus::Behind => "behind",
            PlanStatus::NoTarget => "no target",
        };
        println!("  {}: {} of {} ({progress}, {status})", row.name, row.total, row.plan);
    }
    println!("  total: {} of {}", summary.actual_total, summary.plan_total);
}
