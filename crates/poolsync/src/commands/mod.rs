//! Command dispatch: bridges CLI args to the handlers.

pub mod config_cmd;
pub mod replay;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Replay(args) => replay::handle(args, global).await,
        Command::Config(args) => config_cmd::handle(&args, global),
    }
}
