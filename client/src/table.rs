use comfy_table::{presets::UTF8_HORIZONTAL_ONLY, Attribute, Cell, ContentArrangement, Table};
use kernel::{DatasetListing, RebuildResult, RebuildStatus};

use crate::workflow::{Ingested, WorkflowReport};

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120)
        .set_header(
            header
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
    table
}

#[must_use]
pub fn ingested(ingested: &Ingested) -> Table {
    let mut table = new_table(&["Bucket", "Object", "Payload CID", "Size", "Download URL"]);
    let record = &ingested.record;
    table.add_row(vec![
        Cell::new(&record.bucket),
        Cell::new(&record.name),
        Cell::new(&record.payload_cid),
        Cell::new(record.size),
        Cell::new(&ingested.url),
    ]);
    table
}

#[must_use]
pub fn listing(listing: &DatasetListing) -> Table {
    let mut table = new_table(&["#", "Dataset", "Backup ID", "Source URL"]);
    for entry in &listing.entries {
        table.add_row(vec![
            Cell::new(entry.sequence),
            Cell::new(&entry.dataset),
            Cell::new(entry.backup_id.as_str()),
            Cell::new(&entry.source_url),
        ]);
    }
    table
}

#[must_use]
pub fn rebuild(result: &RebuildResult) -> Table {
    let mut table = new_table(&["Backup ID", "Source URL", "Status", "Detail"]);
    for outcome in &result.outcomes {
        let (status, detail) = match &outcome.status {
            RebuildStatus::Restored { payload_cid } => ("restored", payload_cid.as_str()),
            RebuildStatus::Failed { reason } => ("failed", reason.as_str()),
        };
        table.add_row(vec![
            Cell::new(outcome.backup_id.as_str()),
            Cell::new(&outcome.source_url),
            Cell::new(status),
            Cell::new(detail),
        ]);
    }
    table
}

/// Renders every stage of a finished run.
#[must_use]
pub fn report(report: &WorkflowReport) -> String {
    let mut out = format!(
        "{}\nbackup id: {}\n{}\nbackups listed: {} of {}\n",
        ingested(&report.ingested),
        report.backup_id,
        listing(&report.listing),
        report.listing.entries.len(),
        report.listing.total,
    );
    match &report.rebuild {
        Some(result) => out.push_str(&rebuild(result).to_string()),
        None => out.push_str("rebuild skipped: dataset has no backups"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::{BackupId, DatasetEntry, RebuildOutcome};

    #[test]
    fn listing_has_row_per_entry() {
        // Arrange
        let listing_page = DatasetListing {
            dataset: "ds1".to_owned(),
            offset: 0,
            limit: 10,
            total: 1,
            entries: vec![DatasetEntry {
                dataset: "ds1".to_owned(),
                backup_id: BackupId::new("bak1"),
                source_url: "https://gw.example/ipfs/cidX".to_owned(),
                sequence: 1,
            }],
        };

        // Act
        let rendered = listing(&listing_page).to_string();

        // Assert
        assert!(rendered.contains("bak1"));
        assert!(rendered.contains("https://gw.example/ipfs/cidX"));
    }

    #[test]
    fn rebuild_shows_failure_reason() {
        // Arrange
        let result = RebuildResult {
            backup_id: BackupId::new("bak1"),
            dataset: "ds1".to_owned(),
            outcomes: vec![RebuildOutcome {
                backup_id: BackupId::new("bak1"),
                source_url: "u".to_owned(),
                status: RebuildStatus::Failed {
                    reason: "content unavailable".to_owned(),
                },
            }],
        };

        // Act
        let rendered = rebuild(&result).to_string();

        // Assert
        assert!(rendered.contains("failed"));
        assert!(rendered.contains("content unavailable"));
    }
}
