use bugreport::{
    bugreport,
    collector::{CompileTimeInformation, EnvironmentVariables, OperatingSystem, SoftwareVersion},
    format::Markdown,
};

pub fn run() {
    bugreport!()
        .info(SoftwareVersion::default())
        .info(OperatingSystem::default())
        .info(EnvironmentVariables::list(&[
            "SHELL",
            "TERM",
            "RUST_LOG",
            "METARK_STORAGE_URI",
            "METARK_ACCOUNT",
            "METARK_META_SERVER",
            "METARK_TIMEOUT_SECS",
            "METARK_SANDBOX_PORT",
            "METARK_SANDBOX_DATA_DIR",
            "METARK_SANDBOX_DATA_FILE",
            "METARK_SANDBOX_GATEWAY",
        ]))
        .info(CompileTimeInformation::default())
        .print::<Markdown>();
}
