use catalog_sync::app::{App, ItemChanges, ItemRow};
use catalog_sync::cache::{sort_for_listing, PersistentStore};
use catalog_sync::catalog::types::{parse_price, price_label};
use catalog_sync::catalog::{Item, ItemStatus};
use catalog_sync::config::Config;
use catalog_sync::logging;
use catalog_sync::overlay::ResourceRef;
use catalog_sync::sync::RemoteSource;
use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "catalog-sync")]
#[command(about = "Keep a local catalog cache in sync with the catalog service")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/catalog-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List catalog items
  List {
    /// Ignore the cache and reload from the service
    #[arg(short, long)]
    refresh: bool,
  },
  /// Create an item
  Create {
    #[arg(long)]
    name: String,
    /// Price such as 12.50
    #[arg(long, value_parser = parse_price, default_value = "0")]
    price: u64,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    category: Option<String>,
  },
  /// Change fields of an item
  Update {
    id: u64,
    #[arg(long)]
    name: Option<String>,
    #[arg(long, value_parser = parse_price)]
    price: Option<u64>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    category: Option<String>,
  },
  /// Mark an item active
  Activate { id: u64 },
  /// Mark an item inactive
  Deactivate { id: u64 },
  /// Attach a local resource (e.g. a photo path) to an item on this device
  Pin { id: u64, resource: String },
  /// Remove the local resource of an item
  Unpin { id: u64 },
  /// Refresh periodically and print every change until Ctrl-C
  Watch {
    /// Seconds between refreshes
    #[arg(short, long, default_value_t = 30)]
    interval: u64,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.log)?;

  let app = App::new(&config)?;

  match args.command {
    Command::List { refresh } => {
      let rows = app.load(refresh).await?;
      print_rows(&rows);
      let stats = app.overlay_stats();
      println!(
        "\n{} items, {} with a local resource ({:.0}%)",
        stats.total, stats.with_resource, stats.percent_with_resource
      );
    }
    Command::Create {
      name,
      price,
      description,
      category,
    } => {
      let draft = Item {
        description,
        category,
        ..Item::draft(name, price)
      };
      let created = app.create(draft).await?;
      println!("Created item {} ({})", created.id, created.name);
    }
    Command::Update {
      id,
      name,
      price,
      description,
      category,
    } => {
      let changes = ItemChanges {
        name,
        price_cents: price,
        description,
        category,
      };
      let updated = app.update(id, &changes).await?;
      println!("Updated item {} ({})", updated.id, updated.name);
    }
    Command::Activate { id } => {
      app.set_status(id, ItemStatus::Active).await?;
      println!("Item {} is active", id);
    }
    Command::Deactivate { id } => {
      app.set_status(id, ItemStatus::Inactive).await?;
      println!("Item {} is inactive", id);
    }
    Command::Pin { id, resource } => {
      app.pin(id, ResourceRef::new(resource)).await?;
      println!("Pinned resource to item {}", id);
    }
    Command::Unpin { id } => {
      app.unpin(id).await?;
      println!("Removed resource from item {}", id);
    }
    Command::Watch { interval } => watch(&app, interval).await?,
  }

  Ok(())
}

async fn watch<R, S>(app: &App<R, S>, interval: u64) -> Result<()>
where
  R: RemoteSource<Item>,
  S: PersistentStore,
{
  let mut updates = app.subscribe();
  let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
  let ctrl_c = tokio::signal::ctrl_c();
  tokio::pin!(ctrl_c);

  loop {
    tokio::select! {
      _ = &mut ctrl_c => break,
      _ = ticker.tick() => {
        if let Err(e) = app.load(true).await {
          eprintln!("Refresh failed, showing cached items: {}", e);
        }
      }
      Some(items) = updates.recv() => {
        let refreshed = app
          .refreshed_at()
          .map(|t| t.format("%H:%M:%S").to_string())
          .unwrap_or_else(|| "never".to_string());
        println!("--- {} items (last refresh {})", items.len(), refreshed);
        for item in sort_for_listing(items) {
          println!("{}", format_item(&item, None));
        }
      }
    }
  }

  Ok(())
}

fn print_rows(rows: &[ItemRow]) {
  for row in rows {
    println!("{}", format_item(&row.item, row.resource.as_ref()));
  }
}

fn format_item(item: &Item, resource: Option<&ResourceRef>) -> String {
  format!(
    "{:>6}  {:<32} {:>9}  {:<8}  {}",
    item.id,
    item.name,
    price_label(item.price_cents),
    item.status,
    resource.map(ResourceRef::as_str).unwrap_or("")
  )
}
