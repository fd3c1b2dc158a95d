use buyercache::config::{KEY_VAR, URL_VAR};
use buyercache::{BuyerCache, BuyerRecord, DEFAULT_TABLE, RemoteConfig, RemoteTable, RestTable, SqliteTable};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use eyre::{Result, eyre};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "buyercache")]
#[command(about = "BuyerCache CLI - list, search and edit the buyer table")]
#[command(version)]
struct Cli {
    /// Hosted table endpoint
    #[arg(long, env = URL_VAR, hide_env_values = true)]
    url: Option<String>,

    /// Access key for the hosted table
    #[arg(long, env = KEY_VAR, hide_env_values = true)]
    key: Option<String>,

    /// Use a SQLite database file instead of the hosted table
    #[arg(long, conflicts_with = "local")]
    sqlite: Option<PathBuf>,

    /// Use buyers.db in the platform data directory
    #[arg(long)]
    local: bool,

    /// Table name
    #[arg(short, long, default_value = DEFAULT_TABLE)]
    table: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List buyers, newest purchase first
    List {
        /// Only show buyers whose username, name or interests contain this text
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Add a buyer
    Add {
        #[arg(long)]
        username: String,

        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Update fields of an existing buyer
    Update {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        username: Option<String>,

        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Delete a buyer
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Args)]
struct FieldArgs {
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    first_purchase: Option<String>,

    #[arg(long)]
    last_purchase: Option<String>,

    #[arg(long)]
    interests: Option<String>,

    #[arg(long)]
    notes: Option<String>,
}

impl FieldArgs {
    fn apply(self, record: &mut BuyerRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(first) = self.first_purchase {
            record.first_purchase = first;
        }
        if let Some(last) = self.last_purchase {
            record.last_purchase = last;
        }
        if let Some(interests) = self.interests {
            record.interests = interests;
        }
        if let Some(notes) = self.notes {
            record.notes = notes;
        }
    }
}

fn main() -> Result<()> {
    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let remote: Box<dyn RemoteTable> = if let Some(path) = cli.sqlite {
        Box::new(SqliteTable::open(path)?)
    } else if cli.local {
        let path = dirs::data_dir()
            .ok_or_else(|| eyre!("Could not determine the platform data directory"))?
            .join("buyercache")
            .join("buyers.db");
        Box::new(SqliteTable::open(path)?)
    } else {
        let config = RemoteConfig::new(cli.url, cli.key)?;
        Box::new(RestTable::new(&config)?)
    };

    run(remote, cli.table, cli.command)
}

fn run<R: RemoteTable>(remote: R, table: String, command: Commands) -> Result<()> {
    let mut cache = BuyerCache::with_table(remote, table);
    if let Some(err) = cache.last_load_error() {
        eprintln!("{} could not load buyers: {}", "warning:".yellow().bold(), err);
    }

    match command {
        Commands::List { search } => {
            if let Some(term) = search {
                cache.set_search_term(&term);
            }
            print_buyers(cache.users());
            println!("{} of {} buyers", cache.users().len(), cache.all_users().len());
        }
        Commands::Add { username, fields } => {
            let mut record = BuyerRecord::new(username);
            fields.apply(&mut record);
            let created = cache.add_user(&record)?;
            println!(
                "{} {} (id {})",
                "Added".green().bold(),
                created.username,
                created.id.map(|id| id.to_string()).unwrap_or_default()
            );
        }
        Commands::Update { id, username, fields } => {
            let mut record = cache
                .all_users()
                .iter()
                .find(|r| r.id == Some(id))
                .cloned()
                .ok_or_else(|| eyre!("No buyer with id {}", id))?;
            if let Some(username) = username {
                record.username = username;
            }
            fields.apply(&mut record);
            cache.update_user(&record)?;
            println!("{} {} (id {})", "Updated".green().bold(), record.username, id);
        }
        Commands::Delete { id } => {
            let record = cache
                .all_users()
                .iter()
                .find(|r| r.id == Some(id))
                .cloned()
                .unwrap_or_else(|| BuyerRecord::default().with_id(id));
            cache.delete_user(&record)?;
            println!("{} buyer {}", "Deleted".green().bold(), id);
        }
    }

    Ok(())
}

fn print_buyers(records: &[BuyerRecord]) {
    println!(
        "{}",
        format!(
            "{:>6}  {:<20} {:<24} {:<12} {:<12} {}",
            "ID", "USERNAME", "NAME", "FIRST", "LAST", "INTERESTS"
        )
        .bold()
    );
    for r in records {
        println!(
            "{:>6}  {:<20} {:<24} {:<12} {:<12} {}",
            r.id.map(|id| id.to_string()).unwrap_or_default(),
            r.username,
            r.name,
            r.first_purchase,
            r.last_purchase,
            r.interests
        );
    }
}
