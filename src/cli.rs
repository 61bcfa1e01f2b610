use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;

use crate::config::Config;
use crate::database::Database;
use crate::error::MigrateError;
use crate::money::{self, RescaleMode, RescaleSummary};
use crate::schema;

#[derive(Parser)]
#[command(
    name = "gentech-migrate",
    version,
    about = "Gentech: one-off data migrations for the inventory database"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Rescale every monetary column from currency units to integer cents (run once)
    #[command(name = "to-cents")]
    ToCents {
        /// Database file (default: config `database.path`, then ./gentech.sqlite)
        #[arg(long = "db", short = 'd')]
        db: Option<PathBuf>,

        /// Only rescale values with a fractional part; whole values are left as cents
        #[arg(long = "fractional-only", default_value_t = false)]
        fractional_only: bool,
    },

    /// Replace products.status text with status_id referencing product_statuses
    #[command(name = "normalize-statuses")]
    NormalizeStatuses {
        /// Database file (default: config `database.path`, then ./gentech.sqlite)
        #[arg(long = "db", short = 'd')]
        db: Option<PathBuf>,
    },

    /// Divide products.cost and product_pricing prices by 100 after a double rescale
    #[command(name = "repair-downscale")]
    RepairDownscale {
        /// Database file (default: config `database.path`, then ./gentech.sqlite)
        #[arg(long = "db", short = 'd')]
        db: Option<PathBuf>,
    },

    /// Rewrite voucher amounts as cents and percentage discounts as basis points
    #[command(name = "vouchers-to-cents-bps")]
    VouchersToCentsBps {
        /// Database file (default: config `database.path`, then ./gentech.sqlite)
        #[arg(long = "db", short = 'd')]
        db: Option<PathBuf>,
    },

    /// Rename voucher_types to voucher_discount_types and add a new voucher_types lookup
    #[command(name = "split-voucher-types")]
    SplitVoucherTypes {
        /// Database file (default: config `database.path`, then ./gentech.sqlite)
        #[arg(long = "db", short = 'd')]
        db: Option<PathBuf>,
    },

    /// Rename the platform_pricing table to product_pricing
    #[command(name = "rename-platform-pricing")]
    RenamePlatformPricing {
        /// Database file (default: config `database.path`, then ./gentech.sqlite)
        #[arg(long = "db", short = 'd')]
        db: Option<PathBuf>,
    },
}

impl Cli {
    pub fn handle_command_line() -> Result<(), MigrateError> {
        let args = Cli::parse();
        Self::execute(args.command, Config::get())
    }

    pub fn execute(command: Command, config: &Config) -> Result<(), MigrateError> {
        match command {
            Command::ToCents {
                db,
                fractional_only,
            } => {
                let mode = if fractional_only {
                    RescaleMode::FractionalOnly
                } else {
                    RescaleMode::All
                };
                let mut db = Self::open_database(config, db)?;
                let summary = money::convert_to_cents(db.conn_mut(), mode)?;
                Self::print_summary("Converted to cents", &summary);
            }
            Command::NormalizeStatuses { db } => {
                let mut db = Self::open_database(config, db)?;
                schema::normalize_product_statuses(db.conn_mut())?;
                println!("Product statuses normalized in {}", db.path().display());
            }
            Command::RepairDownscale { db } => {
                let mut db = Self::open_database(config, db)?;
                let summary = money::repair_downscale(db.conn_mut())?;
                Self::print_summary("Downscaled by 100", &summary);
            }
            Command::VouchersToCentsBps { db } => {
                let mut db = Self::open_database(config, db)?;
                let summary = money::convert_vouchers_to_cents_bps(db.conn_mut())?;
                println!(
                    "Updated {} voucher rows to cents/basis points ({} percentage discounts)",
                    summary.vouchers, summary.percentage_discounts
                );
            }
            Command::SplitVoucherTypes { db } => {
                let mut db = Self::open_database(config, db)?;
                schema::split_voucher_types(db.conn_mut())?;
                println!("Voucher types split in {}", db.path().display());
            }
            Command::RenamePlatformPricing { db } => {
                let mut db = Self::open_database(config, db)?;
                schema::rename_platform_pricing(db.conn_mut())?;
                println!(
                    "Renamed platform_pricing to product_pricing in {}",
                    db.path().display()
                );
            }
        }

        Ok(())
    }

    fn open_database(config: &Config, cli_path: Option<PathBuf>) -> Result<Database, MigrateError> {
        let db_path = config.resolve_db_path(cli_path.as_deref());
        info!("Using database {}", db_path.display());
        Database::open(&db_path)
    }

    fn print_summary(action: &str, summary: &RescaleSummary) {
        for column in &summary.columns {
            println!("{:>6}  {}.{}", column.rows, column.table, column.column);
        }
        println!(
            "{}: {} values across {} columns",
            action,
            summary.total_rows(),
            summary.columns.len()
        );
    }
}
