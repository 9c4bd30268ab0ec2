use super::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tollgate", about = "Opaque credential issuing and validation service")]
pub struct Cli {
    #[arg(long)]
    pub settings: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Command {
    /// Serve the HTTP API with the token reaper in the background.
    #[default]
    Serve,
    /// Run only the token reaper.
    Reap {
        /// Purge once and exit instead of looping.
        #[arg(long)]
        once: bool,
    },
}
