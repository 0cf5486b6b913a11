use std::process::ExitCode;

use anyhow::Result;
use clap::{Error as ClapError, Parser as _};
use log::error;

use crate::bora_args::BoraArgs;

mod bora_args;
mod commands;
mod deposits;
mod records;

fn main() -> ExitCode {
    if let Err(error) = try_main() {
        error.downcast_ref().map(ClapError::exit);
        error!("{error:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn try_main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = BoraArgs::try_parse()?;

    commands::dispatch(args)
}
