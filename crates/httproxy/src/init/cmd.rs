use anyhow::Result;

use crate::{cmd::Args, init::logger};

pub fn init() -> Result<Args> {
    let args = Args::parse_or_exit();
    logger::init(&args.log_level.0, args.colored)?;
    log::debug!("{args:?}");
    Ok(args)
}
