use clap::{Parser, Subcommand};
use time::Date;
use timekeep::time_utils::parse_date;

#[derive(Debug, Parser)]
#[command(name = "timekeep")]
#[command(about = "Track working time against a timekeep server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Sign out and remove the local session
    Logout,
    /// Show the signed-in user, the running timer and today's totals
    Status,
    /// Start the timer for a project and task
    Start {
        #[arg(long)]
        project: String,
        #[arg(long)]
        task: String,
    },
    /// Stop the running timer
    Stop,
    /// Show a live counter for the running timer until Ctrl-C
    Watch,
    /// Record a finished entry from two times of day
    Add {
        #[arg(long)]
        project: String,
        #[arg(long)]
        task: String,
        /// Start time, HH:MM
        #[arg(long)]
        start: String,
        /// End time, HH:MM
        #[arg(long)]
        end: String,
        /// Day of the entry, YYYY-MM-DD (defaults to today)
        #[arg(long, value_parser = parse_date)]
        date: Option<Date>,
    },
    /// List time entries
    List {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        task: Option<String>,
        #[arg(long, value_parser = parse_date)]
        date: Option<Date>,
    },
    /// Delete a time entry
    Delete { id: String },
    /// Daily and weekly totals, per-project and per-task time, recent entries
    Summary {
        #[arg(long)]
        project: Option<String>,
        /// Any day of the week to summarize (defaults to today)
        #[arg(long, value_parser = parse_date)]
        date: Option<Date>,
        /// How many recent entries to show
        #[arg(long, default_value_t = 5)]
        recent: usize,
    },
    /// List projects and their tasks
    Projects,
    /// Print config path and create default file if missing
    ConfigPath,
}
