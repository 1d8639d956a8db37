use std::env;

struct VersionInfo {
    name: &'static str,
    version: &'static str,
    os: &'static str,
    architecture: &'static str,
}

impl VersionInfo {
    fn current() -> Self {
        Self {
            name: clap::crate_name!(),
            version: clap::crate_version!(),
            os: env::consts::OS,
            architecture: env::consts::ARCH,
        }
    }
}

pub fn run() {
    let info = VersionInfo::current();

    println!("Name           : {}", info.name);
    println!("Version        : {}", info.version);
    println!("OS             : {}", info.os);
    println!("Architecture   : {}", info.architecture);
}
