//! boxcut command-line tool
//!
//! Cuts a box-prompted object out of an image, or serves the same pipeline
//! over HTTP.

#[cfg(feature = "cli")]
use boxcut::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
