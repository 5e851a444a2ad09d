mod args;

use crate::args::Args;
use clap::Parser;
use crossbuild_common::errors::*;
use crossbuildd::config;
use env_logger::Env;

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let logging = match args.verbose {
        0 => "actix_web=debug,info",
        1 => "actix_web=debug,crossbuildd=debug,crossbuild_worker=debug,crossbuild_common=debug,info",
        2 => "debug",
        3 => "crossbuildd=trace,crossbuild_worker=trace,crossbuild_common=trace,debug",
        _ => "trace",
    };

    env_logger::init_from_env(Env::default().default_filter_or(logging));

    dotenvy::dotenv().ok();
    let config = config::load(args.config.as_deref())?;
    if args.check_config {
        println!("{:#?}", config);
    } else {
        crossbuildd::run_config(config).await?;
    }
    Ok(())
}
