use anyhow::{Result, bail};
use cardsmart_core::{
    Card, CardRankingEngine, DeviceType, EngineConfig, EventContext, GeoFix, LocationSource,
    RankedCards, ScoredCard, UsageAction, detect_device_type, infer_category,
};
use cardsmart_store::FileStorage;
use chrono::Utc;
use chrono_tz::Tz;
use clap::{Parser, Subcommand, ValueEnum};

mod config;
mod state;

use config::{Config, load_config};

#[derive(Parser, Debug)]
#[command(name = "cardsmart", version, about = "CardSmart contextual card ranking CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage the card list (stand-in for the dashboard's card store)
    Cards {
        #[command(subcommand)]
        command: CardsCommand,
    },

    /// Rank the current cards and print the declutter tiers
    Rank {
        /// Limit number of cards printed per tier
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Record a card interaction
    Use {
        card_id: String,

        /// What the user did with the card
        #[arg(long, value_enum, default_value_t = CliAction::Selected)]
        action: CliAction,

        /// Transaction/merchant description; category is inferred from it
        #[arg(long)]
        description: Option<String>,

        /// Explicit transaction type (overrides --description inference)
        #[arg(long)]
        transaction_type: Option<String>,
    },

    /// Tell the ranker a suggestion was accepted or dismissed
    Feedback {
        card_id: String,

        /// Dismissed instead of accepted
        #[arg(long)]
        rejected: bool,
    },

    /// Pin a card to the top of the learned preferences
    Pin { card_id: String },

    /// Unpin a card
    Unpin { card_id: String },

    /// Add tags to a card
    Tag {
        card_id: String,
        tags: Vec<String>,
    },

    /// Remove a tag from a card
    Untag { card_id: String, tag: String },

    /// Show usage patterns (optionally for one card)
    Patterns {
        #[arg(long)]
        card_id: Option<String>,
    },

    /// Set the live transaction context for subsequent interactions
    Context {
        /// Transaction type entering a payment flow; omit to clear
        #[arg(long)]
        transaction: Option<String>,

        /// Link-quality hint, e.g. "wifi" or "4g"
        #[arg(long)]
        network: Option<String>,
    },

    /// Dump all learned state as JSON
    Export,

    /// Clear preferences, model, and usage log. Irreversible.
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Re-rank continuously, refreshing the time context on an interval
    Watch {
        /// Tick interval in seconds
        #[arg(long, default_value_t = 60)]
        interval: u64,

        /// Limit number of cards printed per tier
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum CardsCommand {
    /// Add a card to the list
    Add {
        id: String,
        name: String,

        #[arg(long, default_value = "Credit")]
        kind: String,

        #[arg(long, default_value = "general")]
        category: String,
    },

    /// List known cards
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliAction {
    Selected,
    Rejected,
    Viewed,
}

impl From<CliAction> for UsageAction {
    fn from(a: CliAction) -> Self {
        match a {
            CliAction::Selected => UsageAction::Selected,
            CliAction::Rejected => UsageAction::Rejected,
            CliAction::Viewed => UsageAction::Viewed,
        }
    }
}

/// Location source backed by the config file; errors when nothing is
/// configured so the provider falls back to its sentinel.
struct ConfigLocationSource {
    section: config::LocationSection,
}

impl LocationSource for ConfigLocationSource {
    fn current_fix(&mut self) -> Result<GeoFix> {
        let Some(name) = self.section.name.clone() else {
            bail!("no location configured");
        };
        Ok(match (self.section.latitude, self.section.longitude) {
            (Some(lat), Some(lng)) => GeoFix::new(lat, lng, name),
            _ => GeoFix {
                latitude: None,
                longitude: None,
                name,
                accuracy: None,
            },
        })
    }
}

fn build_engine(cfg: &Config) -> Result<CardRankingEngine<FileStorage>> {
    let tz: Tz = cardsmart_core::time::parse_timezone(&cfg.timezone)?;
    let device: DeviceType = detect_device_type(&cfg.user_agent);
    let storage = FileStorage::open_default()?;

    let mut engine = CardRankingEngine::with_config(
        storage,
        tz,
        device,
        Utc::now(),
        EngineConfig {
            log_cap: cfg.log_cap,
            adaptation: cfg.adaptation_config(),
        },
    );

    let mut source = ConfigLocationSource {
        section: cfg.location.clone(),
    };
    engine.capture_location(&mut source, Utc::now());

    let live = state::read_live_context(&state::context_path()?)?;
    engine.set_transaction_context(live.transaction_type);
    engine.set_network_type(live.network_type);

    Ok(engine)
}

fn print_tier(label: &str, cards: &[ScoredCard], limit: usize) {
    println!("{label} ({}):", cards.len());
    for sc in cards.iter().take(limit) {
        println!(
            "  {:<20} {:.3}  [freq {:.2} rec {:.2} ctx {:.2} pref {:.2} tod {:.2} loc {:.2}]",
            sc.card.name,
            sc.score,
            sc.components.frequency,
            sc.components.recency,
            sc.components.context,
            sc.components.preference,
            sc.components.time_of_day,
            sc.components.location,
        );
    }
}

fn print_ranked(ranked: &RankedCards, limit: usize) {
    print_tier("primary", &ranked.primary, limit);
    print_tier("secondary", &ranked.secondary, limit);
    print_tier("hidden", &ranked.hidden, limit);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = load_config()?;

    match cli.command {
        Command::Cards { command } => match command {
            CardsCommand::Add {
                id,
                name,
                kind,
                category,
            } => {
                let path = state::cards_path()?;
                let mut cards = state::read_cards(&path)?;
                if cards.iter().any(|c| c.id == id) {
                    bail!("card '{id}' already exists");
                }
                cards.push(Card::new(id, name).with_kind(kind).with_category(category));
                state::write_cards(&path, &cards)?;
                println!("added ({} cards total)", cards.len());
            }
            CardsCommand::List => {
                let cards = state::read_cards(&state::cards_path()?)?;
                for c in &cards {
                    println!("{:<20} {:<20} {} / {}", c.id, c.name, c.kind, c.category);
                }
                if cards.is_empty() {
                    println!("no cards yet (cardsmart cards add <id> <name>)");
                }
            }
        },

        Command::Rank { limit } => {
            let cards = state::read_cards(&state::cards_path()?)?;
            let engine = build_engine(&cfg)?;
            let ranked = engine.rank(&cards, Utc::now());
            print_ranked(&ranked, limit);
        }

        Command::Use {
            card_id,
            action,
            description,
            transaction_type,
        } => {
            let mut engine = build_engine(&cfg)?;

            let txn = transaction_type.or_else(|| {
                description
                    .as_deref()
                    .map(|d| infer_category(d).as_str().to_string())
            });
            let mut overrides = EventContext::default();
            if let Some(t) = txn {
                overrides = overrides.with_transaction_type(t);
            }

            let event = engine.log_card_usage(&card_id, action.into(), overrides, Utc::now());
            println!(
                "logged #{} {} {} (txn: {})",
                event.id,
                event.card_id,
                event.action.as_str(),
                event.context.transaction_type.as_deref().unwrap_or("-"),
            );
        }

        Command::Feedback { card_id, rejected } => {
            let mut engine = build_engine(&cfg)?;
            let ctx = EventContext::from(engine.snapshot());
            if rejected {
                engine.learn_from_rejection(&card_id, &ctx);
            } else {
                engine.learn_from_selection(&card_id, &ctx);
            }
            let w = engine.model().weights;
            println!(
                "weights: freq {:.3} rec {:.3} ctx {:.3} pref {:.3} tod {:.3} loc {:.3}",
                w.frequency, w.recency, w.context_match, w.user_preference, w.time_of_day, w.location,
            );
        }

        Command::Pin { card_id } => {
            let mut engine = build_engine(&cfg)?;
            engine.pin_card(&card_id, Utc::now());
            println!("pinned {card_id}");
        }

        Command::Unpin { card_id } => {
            let mut engine = build_engine(&cfg)?;
            engine.unpin_card(&card_id, Utc::now());
            println!("unpinned {card_id}");
        }

        Command::Tag { card_id, tags } => {
            if tags.is_empty() {
                bail!("pass at least one tag");
            }
            let mut engine = build_engine(&cfg)?;
            let entry = engine.tag_card(&card_id, tags, Utc::now());
            println!("tags: {}", entry.tags.iter().cloned().collect::<Vec<_>>().join(", "));
        }

        Command::Untag { card_id, tag } => {
            let mut engine = build_engine(&cfg)?;
            let entry = engine.remove_tag(&card_id, tag, Utc::now());
            println!("tags: {}", entry.tags.iter().cloned().collect::<Vec<_>>().join(", "));
        }

        Command::Patterns { card_id } => {
            let engine = build_engine(&cfg)?;
            let p = engine.usage_patterns(card_id.as_deref());
            if let Some(id) = card_id.as_deref() {
                let ctx = EventContext::from(engine.snapshot());
                println!(
                    "personalized score: {:.3}",
                    engine.personalized_score(id, &ctx)
                );
            }
            println!("total events: {}", p.total);

            let mut hours: Vec<_> = p.by_hour.iter().collect();
            hours.sort();
            for (hour, n) in hours {
                println!("  {hour:02}:00  {n}");
            }
            for (loc, n) in &p.by_location {
                println!("  @{loc}  {n}");
            }
            for (action, n) in &p.by_action {
                println!("  {}  {n}", action.as_str());
            }
        }

        Command::Context {
            transaction,
            network,
        } => {
            let path = state::context_path()?;
            let mut live = state::read_live_context(&path)?;
            live.transaction_type = transaction.clone();
            if network.is_some() {
                live.network_type = network;
            }
            state::write_live_context(&path, &live)?;
            match transaction {
                Some(t) => println!("transaction context: {t}"),
                None => println!("transaction context cleared"),
            }
        }

        Command::Export => {
            let engine = build_engine(&cfg)?;
            let export = engine.export_learning_data(Utc::now());
            println!("{}", serde_json::to_string_pretty(&export)?);
        }

        Command::Reset { yes } => {
            if !yes {
                bail!("this clears all learned state; re-run with --yes to confirm");
            }
            let mut engine = build_engine(&cfg)?;
            engine.reset_learning();
            println!("learning state cleared");
        }

        Command::Watch { interval, limit } => {
            watch(&cfg, interval, limit).await?;
        }
    }

    Ok(())
}

/// Periodic ranking loop: each tick refreshes the time context, re-reads
/// persisted state (so `use`/`pin` from other terminals show up), and
/// re-ranks only when an input meaningfully changed (the tick alone does
/// not re-rank). Ctrl-c cancels cleanly, dropping the interval timer.
async fn watch(cfg: &Config, interval_secs: u64, limit: usize) -> Result<()> {
    let cards_path = state::cards_path()?;
    let mut engine = build_engine(cfg)?;

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
    let mut last_revision: Option<u64> = None;
    let mut cards: Vec<Card> = Vec::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                engine.tick(Utc::now());
                engine.refresh_from_storage();

                let fresh = state::read_cards(&cards_path)?;
                let cards_changed = fresh != cards;
                cards = fresh;

                let revision = engine.revision();
                if cards_changed || last_revision != Some(revision) {
                    last_revision = Some(revision);
                    let ranked = engine.rank(&cards, Utc::now());
                    println!("--- {} ---", Utc::now().to_rfc3339());
                    print_ranked(&ranked, limit);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("stopping watch");
                break;
            }
        }
    }

    Ok(())
}
