use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command, arg, command, crate_name, value_parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

const DEFAULT_LOG_FILTER: &str = "metark=info,client=info,server=info";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = build_cli().get_matches();

    let result: cli::workflow::CommandResult = match cli.subcommand() {
        Some((cli::VERSION_SUBCOMMAND, _)) => {
            cli::version::run();
            Ok(())
        }
        Some((cli::BUGREPORT_SUBCOMMAND, _)) => {
            cli::bugreport::run();
            Ok(())
        }
        Some((cli::SERVER_SUBCOMMAND, _)) => cli::server::run().await.map_err(Into::into),
        Some((cli::RUN_SUBCOMMAND, matches)) => cli::workflow::run(matches).await,
        Some((cli::UPLOAD_SUBCOMMAND, matches)) => cli::workflow::upload(matches).await,
        Some((cli::BACKUP_SUBCOMMAND, matches)) => cli::workflow::backup(matches).await,
        Some((cli::LIST_SUBCOMMAND, matches)) => cli::workflow::list(matches).await,
        Some((cli::REBUILD_SUBCOMMAND, matches)) => cli::workflow::rebuild(matches).await,
        _ => Ok(()),
    };

    report_failure(&cli, result)
}

fn report_failure(cli: &ArgMatches, result: cli::workflow::CommandResult) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let command = cli.subcommand_name().unwrap_or(crate_name!());
            tracing::error!("{command} failed: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_cli() -> Command {
    command!(crate_name!())
        .version(clap::crate_version!())
        .about(clap::crate_description!())
        .arg(
            arg!(--"storage-uri" <URI>)
                .global(true)
                .help("Storage service base URL, overrides METARK_STORAGE_URI"),
        )
        .arg(
            arg!(--"meta-server" <URL>)
                .global(true)
                .help("Metadata archive base URL, overrides METARK_META_SERVER"),
        )
        .subcommand(
            file_args(Command::new(cli::RUN_SUBCOMMAND).about(cli::RUN_DESCRIPTION)).arg(
                arg!(-d --dataset <DATASET>)
                    .required(true)
                    .help("Dataset to back the file up under"),
            ),
        )
        .subcommand(file_args(
            Command::new(cli::UPLOAD_SUBCOMMAND).about(cli::UPLOAD_DESCRIPTION),
        ))
        .subcommand(
            Command::new(cli::BACKUP_SUBCOMMAND)
                .about(cli::BACKUP_DESCRIPTION)
                .arg(
                    arg!(-d --dataset <DATASET>)
                        .required(true)
                        .help("Dataset name"),
                )
                .arg(
                    arg!(-u --url <URL>)
                        .required(true)
                        .help("Retrieval URL of the content to back up"),
                ),
        )
        .subcommand(
            Command::new(cli::LIST_SUBCOMMAND)
                .about(cli::LIST_DESCRIPTION)
                .arg(
                    arg!(-d --dataset <DATASET>)
                        .required(true)
                        .help("Dataset name"),
                )
                .arg(
                    arg!(--offset <OFFSET>)
                        .value_parser(value_parser!(u64))
                        .default_value("0")
                        .help("Number of backups to skip"),
                )
                .arg(
                    arg!(--limit <LIMIT>)
                        .value_parser(value_parser!(u64).range(1..))
                        .default_value("10")
                        .help("Maximum number of backups to list"),
                ),
        )
        .subcommand(
            Command::new(cli::REBUILD_SUBCOMMAND)
                .about(cli::REBUILD_DESCRIPTION)
                .arg(
                    arg!(-i --id <BACKUP_ID>)
                        .required(true)
                        .help("Backup identifier"),
                ),
        )
        .subcommand(Command::new(cli::SERVER_SUBCOMMAND).about(cli::SERVER_DESCRIPTION))
        .subcommand(Command::new(cli::VERSION_SUBCOMMAND).about(cli::VERSION_DESCRIPTION))
        .subcommand(Command::new(cli::BUGREPORT_SUBCOMMAND).about(cli::BUGREPORT_DESCRIPTION))
        .arg_required_else_help(true)
        .disable_version_flag(true)
}

fn file_args(command: Command) -> Command {
    command
        .arg(
            arg!(-f --file <FILE>)
                .required(true)
                .help("Path to the file to upload"),
        )
        .arg(
            arg!(-b --bucket <BUCKET>)
                .required(true)
                .help("Bucket to upload the file into"),
        )
        .arg(
            arg!(-o --object <OBJECT>)
                .required(false)
                .help("Object name, defaults to the file name"),
        )
        .arg(
            Arg::new("no-overwrite")
                .long("no-overwrite")
                .action(ArgAction::SetTrue)
                .help("Fail instead of replacing an existing object"),
        )
}
