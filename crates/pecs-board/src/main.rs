use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pecs_board::{
    asset_cache::{CacheMaintenanceService, CacheStore, EvictionPolicy},
    board::{self, Board, ExportFormat},
    config::Config,
    dataset::DatasetSource,
    fetch::{self, FetchCoordinator},
    keyword_index::{self, KeywordIndex, LearnedTerms},
    models::PictogramId,
    search::{SearchFacade, SearchHit, SearchOutcome},
    speech::{CommandSpeechEngine, Speaker},
    utils::format_memory,
};
use sandboxed_store::SandboxedStore;

#[derive(Parser)]
#[command(name = "pecs-board")]
#[command(version)]
#[command(about = "PECS picture board with offline pictogram search and a local pictogram cache")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "pecs-board.toml")]
    config: String,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Never touch the network (overrides config file)
    #[arg(long)]
    offline: bool,

    /// Cache directory (overrides config file)
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search pictograms by keyword
    Search {
        query: String,
        /// Language of the query; defaults to search.default_locale
        #[arg(short, long, default_value = "")]
        locale: String,
        /// Print the hits as JSON
        #[arg(long)]
        json: bool,
    },
    /// Make sure pictograms are cached
    Fetch {
        /// Pictogram ids
        ids: Vec<String>,
        /// Fetch the pictograms of every board card
        #[arg(long)]
        board: bool,
    },
    /// Show cache statistics
    Stats,
    /// Run one eviction pass
    Evict {
        /// Size budget in MB (defaults to cache.max_size_mb)
        #[arg(long, value_name = "MB")]
        max_size_mb: Option<u64>,
    },
    /// Remove every cached pictogram
    Clear,
    /// List board categories and their cards
    Board {
        /// Only this category
        category: Option<String>,
    },
    /// Build a sentence from card labels and export it with the board
    Export {
        #[arg(short, long, default_value = "csv")]
        format: ExportFormat,
        /// Output file (defaults to board.export_directory/pecsbrada_YYYYMMDD.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Card labels or terms, in sentence order
        words: Vec<String>,
    },
    /// Speak card labels or free text
    Speak {
        #[arg(required = true)]
        words: Vec<String>,
    },
}

/// Everything a command may need, wired from the configuration.
struct Services {
    cache: Arc<CacheStore>,
    coordinator: FetchCoordinator,
    search: SearchFacade,
    board: Board,
    speaker: Speaker,
}

impl Services {
    async fn start(config: &Config) -> Result<Self> {
        let index = Arc::new(keyword_index::load_or_empty(&DatasetSource::from_config(
            &config.dataset,
        )));

        let cache = Arc::new(
            CacheStore::open(config.cache.pictogram_directory())
                .await
                .context("Failed to open pictogram cache")?,
        );

        let learned_store = SandboxedStore::builder()
            .base_directory(&config.cache.directory)
            .build()
            .await
            .context("Failed to open cache directory")?;
        let learned = Arc::new(LearnedTerms::load(learned_store).await);

        let board = Board::new(&index, &config.board);
        let source = fetch::source_from_config(&config.fetch)?;
        info!("Pictogram source: {}", source.describe());

        let coordinator = FetchCoordinator::new(
            Arc::clone(&cache),
            source,
            board.placeholder_catalog(),
            &config.fetch,
        );
        let search = SearchFacade::new(
            Arc::clone(&index),
            coordinator.clone(),
            learned,
            config.search.clone(),
        );
        let speaker = Speaker::new(
            Arc::new(CommandSpeechEngine::detect(&config.speech)),
            &config.speech,
        );

        Ok(Self {
            cache,
            coordinator,
            search,
            board,
            speaker,
        })
    }

    fn index(&self) -> &KeywordIndex {
        self.search.index()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("pecs_board={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if cli.offline {
        config.fetch.offline = true;
    }
    if let Some(cache_dir) = cli.cache_dir {
        config.cache.directory = cache_dir;
    }

    let services = Services::start(&config).await?;
    let mut notices = services.coordinator.subscribe_notices();

    let shutdown = CancellationToken::new();
    let maintenance = CacheMaintenanceService::new(Arc::clone(&services.cache), &config.cache)
        .spawn(shutdown.clone());

    let result = tokio::select! {
        result = run(cli.command, &services, &config) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
    };

    while let Ok(notice) = notices.try_recv() {
        eprintln!("Notice: {}: {}", notice.pictogram_id, notice.message);
    }

    shutdown.cancel();
    if let Err(e) = maintenance.await {
        warn!("Maintenance task ended abnormally: {}", e);
    }
    if let Err(e) = services.cache.flush().await {
        warn!("Failed to persist pictogram access times: {}", e);
    }

    result
}

async fn run(command: Command, services: &Services, config: &Config) -> Result<()> {
    match command {
        Command::Search {
            query,
            locale,
            json,
        } => match services.search.search(&query, &locale).await {
            SearchOutcome::Results(hits) if json => {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            }
            SearchOutcome::Results(hits) => {
                if hits.is_empty() {
                    println!("No pictograms match '{query}'");
                }
                for hit in &hits {
                    print_hit(hit);
                }
            }
            SearchOutcome::Superseded => info!("Search for '{}' was superseded", query),
        },

        Command::Fetch { ids, board } => {
            let mut targets = ids
                .iter()
                .map(|id| id.parse::<PictogramId>())
                .collect::<Result<Vec<_>, _>>()?;
            if board {
                targets.extend(services.board.card_pictograms());
            }
            if targets.is_empty() {
                bail!("Nothing to fetch: pass pictogram ids or --board");
            }

            let handles: Vec<_> = targets
                .iter()
                .map(|id| services.coordinator.ensure(id))
                .collect();
            for asset in join_all(handles.into_iter().map(|handle| handle.wait())).await {
                print_hit(&SearchHit::Asset(asset));
            }
        }

        Command::Stats => {
            let stats = services.cache.stats().await;
            println!("Directory:   {}", stats.directory.display());
            println!("Entries:     {}", stats.total_entries);
            println!("Total size:  {}", format_memory(stats.total_bytes as f64));
            println!("Pinned:      {}", stats.pinned_entries);
            println!("Generation:  {}", stats.generation);
            println!(
                "Index:       {} keyword(s), locales {:?}",
                services.index().len(),
                services.index().locales()
            );
        }

        Command::Evict { max_size_mb } => {
            let service = CacheMaintenanceService::new(Arc::clone(&services.cache), &config.cache);
            let stats = match max_size_mb {
                Some(mb) => {
                    let policy = EvictionPolicy {
                        max_bytes: mb * 1024 * 1024,
                        ..service.policy()
                    };
                    services.cache.evict(policy).await
                }
                None => service.execute_maintenance().await,
            };
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Command::Clear => {
            let removed = services.cache.clear().await?;
            println!(
                "Pictogram cache cleared ({removed} entries, generation {})",
                services.cache.generation()
            );
        }

        Command::Board { category } => {
            let categories = match category {
                Some(name) => vec![
                    board::find_category(&name)
                        .with_context(|| format!("No category named '{name}'"))?,
                ],
                None => services.board.categories().iter().collect(),
            };
            for category in categories {
                println!("{}", category.name);
                for card in category.cards {
                    let state = match services.board.pictogram_for(card) {
                        Some(id) => {
                            format!("{}\t{}", id, services.cache.get(id).await?.fetch_state())
                        }
                        None => "-".to_string(),
                    };
                    println!("  {} {:<12}\t{}", card.emoji, card.label, state);
                }
            }
        }

        Command::Export {
            format,
            output,
            words,
        } => {
            let mut board = Board::new(services.index(), &config.board);
            for word in &words {
                board.tap_named(word)?;
            }
            let content = board::render(format, &board.current_board_state(), &board)?;
            let path = match output {
                Some(path) => {
                    tokio::fs::write(&path, &content)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    path
                }
                None => {
                    board::export::write_export(&config.board.export_directory, format, &content)
                        .await?
                }
            };
            println!("Exported {}", path.display());
        }

        Command::Speak { words } => {
            let mut board = Board::new(services.index(), &config.board);
            let text = if words.iter().all(|word| board::find_card(word).is_some()) {
                for word in &words {
                    board.tap_named(word)?;
                }
                board.sentence_text()
            } else {
                words.join(" ")
            };
            info!("Speaking with {}", services.speaker.describe());
            services.speaker.say(&text).await?;
        }
    }

    Ok(())
}

fn print_hit(hit: &SearchHit) {
    let asset = hit.asset();
    match hit {
        SearchHit::Asset(_) => match asset.local_path() {
            Some(path) => println!("{}\t{}\t{}", asset.id(), asset.fetch_state(), path.display()),
            None => println!("{}\t{}", asset.id(), asset.fetch_state()),
        },
        SearchHit::Placeholder { placeholder, .. } => {
            println!("{}\t{}\t{}", asset.id(), asset.fetch_state(), placeholder.glyph);
        }
    }
}
