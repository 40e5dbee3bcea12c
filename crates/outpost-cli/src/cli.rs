use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use outpost_core::models::MutationStatus;

#[derive(Parser)]
#[command(name = "outpost")]
#[command(about = "Offline-first sync for garage records")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for tenant and remote configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Tenant to act for (overrides the profile)
    #[arg(long, global = true, value_name = "ID")]
    pub tenant: Option<String>,

    /// Path to the shared remote store file (overrides the profile)
    #[arg(long, global = true, value_name = "PATH")]
    pub remote: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save a record locally and queue it for push
    #[command(alias = "save")]
    Add {
        #[command(subcommand)]
        record: AddCommands,
    },
    /// Tombstone a record and queue the delete
    Delete {
        /// Entity type
        #[arg(value_enum)]
        kind: KindArg,
        /// Entity ID
        id: String,
    },
    /// Push pending mutations to the remote store
    Push {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pull every table for the tenant from the remote store
    #[command(alias = "bootstrap")]
    Pull {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply remote changes as they arrive until interrupted
    Listen,
    /// Inspect the mutation queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Inspect and resolve sync conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum AddCommands {
    /// Register a vehicle
    Vehicle {
        plate: String,
        make: String,
        model: String,
        #[arg(long)]
        year: Option<i32>,
        /// Owning customer ID
        #[arg(long, value_name = "ID")]
        customer: Option<String>,
    },
    /// Register a customer
    Customer {
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Register an employee
    Employee {
        name: String,
        #[arg(long, default_value = "mechanic")]
        role: String,
    },
    /// Open a service order for a vehicle
    Order {
        /// Vehicle ID
        #[arg(value_name = "VEHICLE_ID")]
        vehicle: String,
        description: String,
        /// Assigned employee ID
        #[arg(long, value_name = "ID")]
        employee: Option<String>,
        /// Order total in cents
        #[arg(long, default_value = "0")]
        total_cents: i64,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KindArg {
    Vehicle,
    Customer,
    Employee,
    Order,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusArg {
    Pending,
    Synced,
    DiscardedStale,
    Conflict,
    Quarantined,
    Skipped,
}

impl From<StatusArg> for MutationStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => Self::Pending,
            StatusArg::Synced => Self::Synced,
            StatusArg::DiscardedStale => Self::DiscardedStale,
            StatusArg::Conflict => Self::Conflict,
            StatusArg::Quarantined => Self::Quarantined,
            StatusArg::Skipped => Self::Skipped,
        }
    }
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// Count mutations per status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent mutations
    List {
        /// Only show mutations in this status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        /// Number of mutations to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List recorded sync conflicts
    List {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Include conflicts already resolved
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a conflict as handled
    Resolve {
        /// Conflict ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Tenant ID the profile acts for
        #[arg(long = "tenant-id", value_name = "ID")]
        tenant_id: Option<String>,
        /// Shared remote store file
        #[arg(long = "remote-path", value_name = "PATH")]
        remote_path: Option<PathBuf>,
        /// Mutations pushed per cycle
        #[arg(long, value_name = "N")]
        batch_size: Option<usize>,
        /// Transient failures tolerated before quarantine
        #[arg(long, value_name = "N")]
        max_retries: Option<u32>,
        /// Do not make this the active profile
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
