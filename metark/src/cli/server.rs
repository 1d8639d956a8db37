use std::io;

pub async fn run() -> io::Result<()> {
    server::run().await
}
