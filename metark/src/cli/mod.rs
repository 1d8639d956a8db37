pub mod bugreport;
pub mod server;
pub mod version;
pub mod workflow;

pub const SERVER_SUBCOMMAND: &str = "server";
pub const SERVER_DESCRIPTION: &str = "Run the local sandbox emulating storage, gateway and archive";

pub const VERSION_SUBCOMMAND: &str = "version";
pub const VERSION_DESCRIPTION: &str = "Display the version and build information";

pub const BUGREPORT_SUBCOMMAND: &str = "bugreport";
pub const BUGREPORT_DESCRIPTION: &str = "Collect information about the system and the environment that you can send along with a bug report";

pub const RUN_SUBCOMMAND: &str = "run";
pub const RUN_DESCRIPTION: &str =
    "Upload a file, back its retrieval URL up under a dataset and rebuild the dataset";

pub const UPLOAD_SUBCOMMAND: &str = "upload";
pub const UPLOAD_DESCRIPTION: &str =
    "Upload a file into a bucket and print its content record and retrieval URL";

pub const BACKUP_SUBCOMMAND: &str = "backup";
pub const BACKUP_DESCRIPTION: &str = "Back a retrieval URL up under a dataset";

pub const LIST_SUBCOMMAND: &str = "list";
pub const LIST_DESCRIPTION: &str = "List the backups of a dataset";

pub const REBUILD_SUBCOMMAND: &str = "rebuild";
pub const REBUILD_DESCRIPTION: &str = "Rebuild the dataset a backup belongs to";
