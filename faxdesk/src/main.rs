use anyhow::Result;
use clap::Parser;

use faxdesk::app::{application, args};

fn main() -> Result<()> {
    let args = args::Args::parse();
    application::run_app(args)
}
