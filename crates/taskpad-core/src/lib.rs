pub mod api;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod error;
pub mod http;
pub mod render;
pub mod session;
pub mod task;
pub mod validate;
pub mod view;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::{
  Context,
  anyhow
};
use clap::Parser;
use tracing::{
  debug,
  info,
  warn
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    command = cli.command.name(),
    "starting taskpad CLI"
  );

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  );
  debug!(
    files = ?cfg.loaded_files,
    "configuration ready"
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let cache = cache::LocalCache::open(
    &data_dir
  )
  .with_context(|| {
    format!(
      "failed to open local cache at \
       {}",
      data_dir.display()
    )
  })?;
  let sessions: Arc<
    dyn session::SessionStore
  > = Arc::new(
    session::FileSessionStore::open(
      &data_dir
    )?
  );

  let zone =
    datetime::DisplayZone::resolve(&cfg);
  let renderer =
    render::Renderer::new(&cfg)?;
  let command = cli.command;

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  runtime.block_on(async {
    tokio::select! {
      result = commands::dispatch(
        &cfg,
        &cache,
        sessions,
        &renderer,
        zone,
        command
      ) => result,
      signal = tokio::signal::ctrl_c() => match signal {
        | Ok(()) => {
          warn!("interrupted; abandoning in-flight request");
          Err(anyhow!("interrupted"))
        }
        | Err(err) => Err(anyhow::Error::new(err)
          .context("failed to listen for Ctrl-C"))
      }
    }
  })?;

  info!("done");
  Ok(())
}
