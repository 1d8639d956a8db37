use std::error::Error;

use clap::ArgMatches;
use client::{ArchiveClient, FileJob, RunJob, StorageClient, Workflow, WorkflowConfig, table};
use kernel::{BackupId, Page};

pub type CommandResult = Result<(), Box<dyn Error>>;

type HttpWorkflow = Workflow<StorageClient, ArchiveClient>;

pub async fn run(matches: &ArgMatches) -> CommandResult {
    let job = RunJob {
        file: file_job(matches)?,
        dataset: value(matches, "dataset")?.to_owned(),
        page: Page::default(),
    };
    let report = workflow(matches)?.run(&job).await?;
    println!("{}", table::report(&report));
    Ok(())
}

pub async fn upload(matches: &ArgMatches) -> CommandResult {
    let job = file_job(matches)?;
    let ingested = workflow(matches)?.ingest(&job).await?;
    println!("{}", table::ingested(&ingested));
    Ok(())
}

pub async fn backup(matches: &ArgMatches) -> CommandResult {
    let dataset = value(matches, "dataset")?;
    let url = value(matches, "url")?;
    let backup_id = workflow(matches)?.backup(dataset, url).await?;
    println!("backup id: {backup_id}");
    Ok(())
}

pub async fn list(matches: &ArgMatches) -> CommandResult {
    let dataset = value(matches, "dataset")?;
    let defaults = Page::default();
    let page = Page {
        offset: matches
            .get_one::<u64>("offset")
            .copied()
            .unwrap_or(defaults.offset),
        limit: matches
            .get_one::<u64>("limit")
            .copied()
            .unwrap_or(defaults.limit),
    };
    let listing = workflow(matches)?.list(dataset, page).await?;
    if listing.is_empty() {
        println!("dataset {dataset} has no backups");
    } else {
        println!("{}", table::listing(&listing));
        println!("{} of {}", listing.entries.len(), listing.total);
    }
    Ok(())
}

pub async fn rebuild(matches: &ArgMatches) -> CommandResult {
    let backup_id = BackupId::new(value(matches, "id")?);
    let result = workflow(matches)?.rebuild(&backup_id).await?;
    println!("{}", table::rebuild(&result));
    println!(
        "dataset {}: {} of {} restored",
        result.dataset,
        result.restored(),
        result.outcomes.len()
    );
    Ok(())
}

fn workflow(matches: &ArgMatches) -> client::Result<HttpWorkflow> {
    let config = WorkflowConfig::from_env_and_args(
        matches.get_one::<String>("storage-uri").map(String::as_str),
        matches.get_one::<String>("meta-server").map(String::as_str),
    )?;
    Workflow::from_config(&config)
}

fn file_job(matches: &ArgMatches) -> client::Result<FileJob> {
    let mut job = FileJob::new(value(matches, "bucket")?, value(matches, "file")?)?
        .with_overwrite(!matches.get_flag("no-overwrite"));
    if let Some(object) = matches.get_one::<String>("object") {
        job = job.with_object(object)?;
    }
    Ok(job)
}

fn value<'a>(matches: &'a ArgMatches, id: &str) -> client::Result<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| client::Error::InvalidInput(format!("--{id} is required")))
}
