mod cli;
mod config;
mod database;
mod error;
mod money;
mod schema;
mod statuses;

use cli::Cli;
use config::{Config, CONFIG};
use directories::ProjectDirs;
use error::MigrateError;
use flexi_logger::{
    detailed_format, Age, Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming,
};
use log::{debug, error};

fn main() {
    let project_dirs = ProjectDirs::from("", "", "gentech-migrate");
    let config = Config::load_config(project_dirs.as_ref());

    // Logging is best effort: without a log file, fall back to stderr alone
    let logger = match setup_logging(project_dirs.as_ref(), &config) {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("Failed to initialize file logging: {}", err);
            match setup_stderr_logging(&config) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    eprintln!("Failed to initialize logging: {}", err);
                    None
                }
            }
        }
    };

    let _ = CONFIG.set(config);

    debug!(
        "Command-line args: {:?}",
        std::env::args_os().collect::<Vec<_>>()
    );

    if let Err(err) = Cli::handle_command_line() {
        error!("{:?}", err);
        eprintln!("{}", err);
        if let Some(handle) = &logger {
            handle.flush();
        }
        std::process::exit(1);
    }
}

/// Log to a daily-rotated file under the local data dir, echoing info and
/// above to stderr. Without a data dir everything goes to stderr.
fn setup_logging(
    project_dirs: Option<&ProjectDirs>,
    config: &Config,
) -> Result<LoggerHandle, MigrateError> {
    let logger = Logger::try_with_str(config.logging.log_spec())?;

    let logger = match project_dirs {
        Some(dirs) => logger
            .log_to_file(
                FileSpec::default()
                    .directory(dirs.data_local_dir().join("logs"))
                    .basename("gentech-migrate"),
            )
            .format_for_files(detailed_format)
            .duplicate_to_stderr(Duplicate::Info)
            .rotate(
                Criterion::Age(Age::Day),
                Naming::Timestamps,
                Cleanup::KeepLogFiles(30),
            ),
        None => logger.log_to_stderr(),
    };

    Ok(logger.start()?)
}

fn setup_stderr_logging(config: &Config) -> Result<LoggerHandle, MigrateError> {
    Ok(Logger::try_with_str(config.logging.log_spec())?
        .log_to_stderr()
        .start()?)
}
