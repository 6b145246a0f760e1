//! `cfgr`: lint rulesets, evaluate selections and manage stored schemas.

use clap::Parser;

mod cli;
use cli::Cli;

fn main() -> anyhow::Result<()> {
    Cli::parse().run()
}
