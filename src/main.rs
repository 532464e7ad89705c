mod api;
mod app;
mod cache;
mod config;
mod event;
mod listing;
mod logging;
mod query;
mod ui;

use api::{HttpTransport, ListFetcher, ListResult, ListView, Transport};
use cache::{NoopStorage, SqliteStorage, TtlCache};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use config::Config;
use listing::{PerPage, QueryState, Resource, SortOrder};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "zorg")]
#[command(about = "Cached client for the ZorgFinder directory API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/zorg/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print one page of a resource
  List {
    resource: Resource,
    /// Free-text search
    #[arg(short, long)]
    search: Option<String>,
    /// Extra filter as key=value (repeatable)
    #[arg(short, long = "filter", value_parser = parse_pair)]
    filters: Vec<(String, Value)>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    /// 10, 20, 50 or 100 (default from config)
    #[arg(long)]
    per_page: Option<PerPage>,
    /// newest, oldest, name_asc, name_desc or rating
    #[arg(long)]
    sort: Option<SortOrder>,
    /// List the trash instead of active items
    #[arg(long)]
    trashed: bool,
    /// Skip the cache and ask the server
    #[arg(long)]
    refresh: bool,
    /// Print the raw result as JSON
    #[arg(long)]
    json: bool,
  },
  /// Move an item to the trash
  Delete { resource: Resource, id: u64 },
  /// Bring an item back from the trash
  Restore { resource: Resource, id: u64 },
  /// Update fields of an item
  Patch {
    resource: Resource,
    id: u64,
    /// Field to change as key=value (repeatable, value parsed as JSON)
    #[arg(long = "set", value_parser = parse_pair, required = true)]
    changes: Vec<(String, Value)>,
  },
  /// Browse a resource in the terminal
  Browse {
    resource: Resource,
    #[arg(long)]
    trashed: bool,
  },
  /// Manage the response cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  /// Drop cached pages of one resource, or everything
  Clear { resource: Option<Resource> },
}

/// Parse `key=value`, reading the value as JSON and falling back to a plain string.
fn parse_pair(s: &str) -> Result<(String, Value), String> {
  let (key, raw) = s
    .split_once('=')
    .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
  let key = key.trim();
  if key.is_empty() {
    return Err(format!("missing key in '{}'", s));
  }
  let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
  Ok((key.to_string(), value))
}

fn build_fetcher(config: &Config) -> Result<ListFetcher> {
  let cache = if config.cache.enabled {
    let path = config.cache_path()?;
    match SqliteStorage::open(&path) {
      Ok(storage) => TtlCache::new(storage),
      Err(e) => {
        warn!(path = %path.display(), error = %e, "cache database unavailable, caching in memory only");
        TtlCache::new(NoopStorage)
      }
    }
  } else {
    TtlCache::new(NoopStorage)
  };

  let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config)?);
  Ok(ListFetcher::new(transport, Arc::new(cache), config.cache.ttl_secs))
}

fn print_table(resource: Resource, result: &ListResult) {
  let columns = resource.columns();
  let rows: Vec<Vec<String>> = result
    .items
    .iter()
    .map(|record| columns.iter().map(|c| ui::cell_text(record.get(*c))).collect())
    .collect();

  let widths: Vec<usize> = columns
    .iter()
    .enumerate()
    .map(|(i, c)| {
      rows
        .iter()
        .map(|row| row[i].chars().count())
        .chain(std::iter::once(c.len()))
        .max()
        .unwrap_or(0)
    })
    .collect();

  let line = |cells: Vec<String>| {
    cells
      .iter()
      .zip(&widths)
      .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
      .collect::<Vec<_>>()
      .join("  ")
      .trim_end()
      .to_string()
  };

  println!("{}", line(columns.iter().map(|c| c.to_uppercase()).collect()));
  for row in rows {
    println!("{}", line(row));
  }
}

async fn run_list(fetcher: &ListFetcher, resource: Resource, params: QueryState, refresh: bool, json: bool) -> Result<()> {
  let fetched = if refresh {
    fetcher.refresh(resource, &params).await?
  } else {
    fetcher.fetch(resource, &params).await?
  };

  let result = match fetched.view {
    ListView::Error(e) => return Err(eyre!("Failed to load {}: {}", resource, e)),
    ListView::Empty => ListResult::default(),
    ListView::Loaded(result) => result,
  };

  if json {
    println!("{}", serde_json::to_string_pretty(&result)?);
    return Ok(());
  }

  if result.items.is_empty() {
    println!("No records found.");
  } else {
    print_table(resource, &result);
    println!(
      "\n{} of {} (page {}, {}/page, {:?})",
      result.items.len(),
      result.total,
      params.page,
      params.per_page.get(),
      fetched.source
    );
  }
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // The guard flushes buffered log lines on drop
  let _log_guard = logging::init()?;

  let config = Config::load(args.config.as_deref())?;
  info!(site = %config.site.url, "starting");

  let fetcher = build_fetcher(&config)?;

  match args.command {
    Command::List {
      resource,
      search,
      filters,
      page,
      per_page,
      sort,
      trashed,
      refresh,
      json,
    } => {
      let mut params = QueryState::new()
        .with_page(page)
        .with_per_page(per_page.unwrap_or(config.list.per_page))
        .with_sort(sort.unwrap_or_default())
        .with_trashed(trashed);
      if let Some(search) = search {
        params = params.with_filter("search", search);
      }
      for (key, value) in filters {
        params = params.with_filter(key, value);
      }
      run_list(&fetcher, resource, params, refresh, json).await?;
    }
    Command::Delete { resource, id } => {
      fetcher
        .delete_item(resource, id)
        .await
        .map_err(|e| eyre!("Could not delete {} #{}: {}", resource, id, e))?;
      println!("Moved {} #{} to trash", resource, id);
    }
    Command::Restore { resource, id } => {
      fetcher
        .restore_item(resource, id)
        .await
        .map_err(|e| eyre!("Could not restore {} #{}: {}", resource, id, e))?;
      println!("Restored {} #{}", resource, id);
    }
    Command::Patch {
      resource,
      id,
      changes,
    } => {
      let body: Map<String, Value> = changes.into_iter().collect();
      fetcher
        .patch_item(resource, id, Value::Object(body))
        .await
        .map_err(|e| eyre!("Could not update {} #{}: {}", resource, id, e))?;
      println!("Updated {} #{}", resource, id);
    }
    Command::Browse { resource, trashed } => {
      let params = QueryState::new()
        .with_per_page(config.list.per_page)
        .with_trashed(trashed);
      let mut app = app::App::new(fetcher, config.site.url.clone(), resource, params);
      app.run().await?;
    }
    Command::Cache {
      action: CacheAction::Clear { resource },
    } => match resource {
      Some(resource) => {
        let dropped = fetcher.invalidate(resource);
        println!("Dropped {} cached page(s) of {}", dropped, resource);
      }
      None => {
        fetcher.cache().clear();
        println!("Cache cleared");
      }
    },
  }

  Ok(())
}
