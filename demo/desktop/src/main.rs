use std::{env, path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use crosscall_boundary::{ModuleLoader, Registry, RegistryConfig, StaticLoader};
use log::{error, info};

mod error;
mod grab_bag;
mod keyboard_demo;
mod managed;

use error::Result;

/// Loads the demo native module and calls into it.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Module identifier or path of the native library.
    #[arg(long, default_value = crosscall_demo_native::MODULE_NAME)]
    library: String,

    /// Directory searched for the native library. May be repeated; searched
    /// before CROSSCALL_LIBRARY_PATH.
    #[arg(long = "library-path", value_name = "DIR")]
    library_paths: Vec<PathBuf>,

    /// Use the native module linked into this binary instead of loading it.
    #[arg(long)]
    in_process: bool,

    /// Retry failed entry point lookups after another module is loaded.
    #[arg(long)]
    retry_failed: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn registry_config(args: &Args) -> RegistryConfig {
    let mut config = RegistryConfig::from_env();
    config.search_paths.splice(0..0, args.library_paths.iter().cloned());
    if config.search_paths.is_empty() {
        // Next to the binary, where cargo puts the cdylib.
        if let Some(dir) = env::current_exe().ok().and_then(|exe| exe.parent().map(PathBuf::from)) {
            config.search_paths.push(dir);
        }
    }
    if args.retry_failed {
        config.retry_failed_after_load = true;
    }
    config
}

fn run(args: Args) -> Result<()> {
    let config = registry_config(&args);
    let (registry, identifier) = if args.in_process {
        let loader: Box<dyn ModuleLoader> =
            Box::new(StaticLoader::new().with_module(crosscall_demo_native::module()));
        (
            Registry::with_loaders(config, vec![loader]),
            crosscall_demo_native::MODULE_NAME.to_owned(),
        )
    } else {
        info!("Library search path(s): {:?}", config.search_paths);
        (Registry::new(config), args.library.clone())
    };
    registry.load(&identifier)?;

    let dispatcher = Arc::new(managed::dispatcher(Arc::new(registry))?);
    grab_bag::run(&dispatcher)?;
    keyboard_demo::run(dispatcher)?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    simple_logger::init_with_level(level).unwrap();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
