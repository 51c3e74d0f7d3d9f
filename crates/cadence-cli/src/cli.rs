use clap::{Parser, Subcommand};

/// In-process periodic and one-shot task scheduler.
#[derive(Parser, Debug)]
#[command(
    name = "cadence",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CADENCE_GIT_SHA"), ")"),
    about
)]
pub struct CliArgs {
    /// Path to config file (default: $CADENCE_CONFIG, then ~/.cadence/cadence.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run periodic tasks on their cron schedules. Run exactly one scheduler per database.
    Scheduler,

    /// Manage periodic task definitions
    #[command(subcommand)]
    Periodic(PeriodicCommand),

    /// Run one-shot tasks and inspect execution records
    #[command(subcommand)]
    Task(TaskCommand),
}

#[derive(Subcommand, Debug)]
pub enum PeriodicCommand {
    /// List all periodic tasks, newest first
    List,

    /// Create an enabled periodic task
    Add {
        /// Registered task name, e.g. CalcFib
        #[arg(long)]
        name: String,

        /// Standard 5-field cron expression, e.g. "*/5 * * * *"
        #[arg(long)]
        cron: String,

        /// Positional arguments as a JSON array, e.g. "[10]"
        #[arg(long, default_value = "[]")]
        args: String,
    },

    /// Delete a periodic task
    Delete { id: i64 },

    /// Flip the enabled flag of a periodic task
    Toggle { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Run a task once and wait for its result
    Apply {
        #[arg(long)]
        name: String,

        /// Positional arguments as a JSON array
        #[arg(long, default_value = "[]")]
        args: String,
    },

    /// List execution records, newest first
    List {
        #[arg(long, default_value = "0")]
        offset: usize,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Print the registered task names
    Names,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn parses_periodic_add() {
        let args = CliArgs::parse_from([
            "cadence", "periodic", "add", "--name", "CalcFib", "--cron", "*/5 * * * *", "--args",
            "[10]",
        ]);
        match args.command {
            Command::Periodic(PeriodicCommand::Add { name, cron, args }) => {
                assert_eq!(name, "CalcFib");
                assert_eq!(cron, "*/5 * * * *");
                assert_eq!(args, "[10]");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let args = CliArgs::parse_from(["cadence", "scheduler", "--config", "/etc/cadence.toml"]);
        assert_eq!(args.config.as_deref(), Some("/etc/cadence.toml"));
        assert!(matches!(args.command, Command::Scheduler));
    }
}
