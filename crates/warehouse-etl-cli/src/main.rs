//! warehouse-etl CLI - replicate operational databases into the warehouse.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use warehouse_etl::{
    Config, ConnectionDescriptor, Driver, EtlError, HealthReport, Operation, OperationResult,
    ReplicationCoordinator, SslMode,
};

#[derive(Parser)]
#[command(name = "warehouse-etl")]
#[command(about = "Replicate PostgreSQL, MySQL/MariaDB and SQL Server databases into a PostgreSQL warehouse")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a data source and load all of its tables
    Connect {
        /// Data source name, used as the warehouse table prefix
        name: String,

        /// Source driver: postgres, mysql, mariadb or sqlserver
        #[arg(long)]
        driver: Option<String>,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        #[arg(long)]
        database: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        password: Option<String>,

        /// disable, prefer, require, verify-ca or verify-full
        #[arg(long)]
        ssl_mode: Option<String>,
    },

    /// Truncate and reload the existing warehouse tables of a data source
    Refresh {
        name: String,
    },

    /// Drop and reload every warehouse table of a data source
    FullRefresh {
        name: String,
    },

    /// Drop the warehouse tables of a data source and deregister it
    Delete {
        name: String,
    },

    /// List warehouse tables grouped by data source
    Catalog,

    /// Show the columns of a warehouse table
    Describe {
        table: String,
    },

    /// Test warehouse and source connections
    HealthCheck {
        /// Also check this data source
        #[arg(long)]
        source: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), EtlError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(EtlError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let coordinator = ReplicationCoordinator::from_config(&config).await?;

    match cli.command {
        Commands::Connect {
            name,
            driver,
            host,
            port,
            database,
            username,
            password,
            ssl_mode,
        } => {
            let overrides = DescriptorOverrides {
                driver,
                host,
                port,
                database,
                username,
                password,
                ssl_mode,
            };
            let descriptor = overrides.apply(config.source(&name))?;
            let result = coordinator.connect(&name, &descriptor).await;
            print_operation(result, cli.output_json)?;
        }

        Commands::Refresh { name } => {
            let result = coordinator.refresh(&name).await;
            print_operation(result, cli.output_json)?;
        }

        Commands::FullRefresh { name } => {
            let result = coordinator.full_refresh(&name).await;
            print_operation(result, cli.output_json)?;
        }

        Commands::Delete { name } => {
            let result = coordinator.delete(&name).await;
            print_operation(result, cli.output_json)?;
        }

        Commands::Catalog => {
            let catalog = coordinator.catalog().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&catalog)?);
            } else {
                println!("Warehouse schema: {}", catalog.schema);
                for group in &catalog.groups {
                    match &group.data_source {
                        Some(ds) => println!(
                            "\n{} ({} tables, {} {}@{})",
                            group.name, group.table_count, ds.driver, ds.database, ds.host
                        ),
                        None => println!("\n{} ({} tables)", group.name, group.table_count),
                    }
                    for table in &group.tables {
                        println!("  {}", table);
                    }
                }
                println!("\nTotal tables: {}", catalog.total_tables());
            }
        }

        Commands::Describe { table } => {
            let columns = coordinator.describe_table(&table).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&columns)?);
            } else {
                println!("{}:", table);
                for col in &columns {
                    println!(
                        "  {:<32} {:<36} {}{}",
                        col.name,
                        col.sql_type,
                        if col.nullable { "NULL" } else { "NOT NULL" },
                        col.default
                            .as_deref()
                            .map(|d| format!(" DEFAULT {}", d))
                            .unwrap_or_default()
                    );
                }
            }
        }

        Commands::HealthCheck { source } => {
            let descriptor = match source {
                Some(name) => Some(resolve_source(&config, &coordinator, &name).await?),
                None => None,
            };
            let result = coordinator.health_check(descriptor.as_ref()).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_health(&result);
            }

            if !result.healthy {
                return Err(EtlError::connection("health-check", "Health check failed"));
            }
        }
    }

    Ok(())
}

/// Connection fields given on the command line, layered over a
/// `sources:` entry from the config file when one exists.
struct DescriptorOverrides {
    driver: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    ssl_mode: Option<String>,
}

impl DescriptorOverrides {
    fn apply(self, base: Option<&ConnectionDescriptor>) -> Result<ConnectionDescriptor, EtlError> {
        let driver = match (self.driver, base) {
            (Some(d), _) => d.parse::<Driver>()?,
            (None, Some(b)) => b.driver,
            (None, None) => {
                return Err(EtlError::Validation(
                    "--driver is required when the source is not in the config file".into(),
                ))
            }
        };
        let ssl_mode = match (self.ssl_mode, base) {
            (Some(m), _) => m.parse::<SslMode>()?,
            (None, Some(b)) => b.ssl_mode,
            (None, None) => SslMode::default(),
        };

        let descriptor = ConnectionDescriptor {
            driver,
            host: self
                .host
                .or_else(|| base.map(|b| b.host.clone()))
                .unwrap_or_default(),
            port: self.port.or_else(|| base.and_then(|b| b.port)),
            database: self
                .database
                .or_else(|| base.map(|b| b.database.clone()))
                .unwrap_or_default(),
            username: self
                .username
                .or_else(|| base.map(|b| b.username.clone()))
                .unwrap_or_default(),
            password: self
                .password
                .or_else(|| base.map(|b| b.password.clone()))
                .unwrap_or_default(),
            ssl_mode,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// Descriptor for `--source NAME`: the config file first, then the
/// registered DataSource.
async fn resolve_source(
    config: &Config,
    coordinator: &ReplicationCoordinator,
    name: &str,
) -> Result<ConnectionDescriptor, EtlError> {
    if let Some(descriptor) = config.source(name) {
        return Ok(descriptor.clone());
    }
    coordinator
        .data_source(name)
        .await?
        .map(|ds| ds.to_descriptor())
        .ok_or_else(|| EtlError::NotFound(name.to_string()))
}

fn print_operation(result: OperationResult, output_json: bool) -> Result<(), EtlError> {
    let report = match result {
        Ok(report) => report,
        Err(failure) => {
            if output_json {
                println!("{}", serde_json::to_string_pretty(&failure.report)?);
            }
            return Err(failure.error);
        }
    };

    if output_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n{}", report.message);
    println!("  Duration: {:.2}s", report.duration_seconds);
    for table in &report.tables {
        println!(
            "  {} -> {}: {} rows ({:.0} rows/sec)",
            table.source_table, table.warehouse_table, table.rows_count, table.rows_per_second
        );
    }
    for table in &report.refreshed_tables {
        println!(
            "  {} -> {}: {} rows ({:.2}s)",
            table.source_table,
            table.warehouse_table,
            table.rows_refreshed,
            table.processing_time_seconds
        );
    }
    if !report.skipped_tables.is_empty() {
        println!("  Skipped: {}", report.skipped_tables.join(", "));
    }
    if report.operation == Operation::Delete && !report.deleted_tables.is_empty() {
        println!("  Dropped: {}", report.deleted_tables.join(", "));
    }
    if !report.warnings.is_empty() {
        println!("  Warnings:");
        for warning in &report.warnings {
            println!("    {}", warning);
        }
    }
    Ok(())
}

fn print_health(result: &HealthReport) {
    println!("Health Check Results:");
    println!(
        "  Warehouse (PostgreSQL): {} ({}ms)",
        if result.warehouse_connected { "OK" } else { "FAILED" },
        result.warehouse_latency_ms
    );
    if let Some(ref err) = result.warehouse_error {
        println!("    Error: {}", err);
    }
    if let (Some(source), Some(connected)) = (&result.source, result.source_connected) {
        println!(
            "  Source ({}): {} ({}ms)",
            source,
            if connected { "OK" } else { "FAILED" },
            result.source_latency_ms.unwrap_or(0)
        );
        if let Some(ref err) = result.source_error {
            println!("    Error: {}", err);
        }
    }
    println!(
        "\n  Overall: {}",
        if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
    );
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
