use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use stellar_core::ElementId;
use stellar_data::policy::save_review;
use stellar_data::{
    document, AutoCreate, CatalogRegistry, EngineConfig, ExternalResolver, IngestionPipeline, JsonAliasStore,
    OperatorQueue, ParamSourceTables, RateLimited, RepresentativeErrors, Resolution, ResolutionPolicy,
    SimbadTapResolver, SolarNorms, StarResolver, StaticResolver,
};

#[derive(Parser)]
#[command(name = "stellar")]
#[command(about = "Star identity resolution and abundance catalog merge")]
struct Cli {
    /// Engine configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the in-memory resolver instead of the network service
    #[arg(long, global = true)]
    offline: bool,

    /// Records for the offline resolver (JSON array)
    #[arg(long, global = true)]
    offline_records: Option<PathBuf>,

    /// Defer unresolved stars to a review file instead of auto-creating them
    #[arg(long, global = true)]
    interactive: bool,

    /// Alias store file
    #[arg(long, global = true, default_value = "data/aliases.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve star names to canonical identities
    Resolve {
        /// One argument per star; alternative names separated by '|'
        #[arg(required = true)]
        names: Vec<String>,

        #[arg(long, default_value = "cli")]
        origin: String,

        /// Where deferred names are written
        #[arg(long, default_value = "data/review.json")]
        review: PathBuf,
    },

    /// Ingest every registered catalog and write star documents
    Ingest {
        /// Catalog registry CSV (short,long,norm)
        #[arg(long, default_value = "data/catalogs.csv")]
        registry: PathBuf,

        /// Directory of catalog CSV files named by short name
        #[arg(long, default_value = "data/catalogs")]
        catalog_dir: PathBuf,

        /// Solar normalization table
        #[arg(long, default_value = "data/solar_norms.csv")]
        norms: PathBuf,

        /// Representative error table (JSON)
        #[arg(long)]
        errors: Option<PathBuf>,

        /// Directory with gaia/pastel/xhip/nea parameter tables
        #[arg(long)]
        params: Option<PathBuf>,

        /// One JSON document per star in this directory
        #[arg(short, long, default_value = "data/stars")]
        output: PathBuf,

        /// Also write every star into one JSON array
        #[arg(long)]
        array: Option<PathBuf>,

        #[arg(long, default_value = "data/review.json")]
        review: PathBuf,

        #[arg(long, default_value = "data/run_summary.json")]
        summary: PathBuf,
    },

    /// Print an overview of a star document array
    Summary {
        #[arg(short, long)]
        input: PathBuf,

        /// Normalization scale to report
        #[arg(long, default_value = "absolute")]
        scale: String,
    },

    /// List the solar normalization scales in a table
    Norms {
        #[arg(long, default_value = "data/solar_norms.csv")]
        norms: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Resolve { names, origin, review } => {
            let mut resolver = build_resolver(&cli, &config)?;
            let stars: Vec<Vec<String>> =
                names.iter().map(|arg| arg.split('|').map(|n| n.trim().to_string()).collect()).collect();
            let results = resolver.resolve_batch(&stars, origin).context("external resolution failed")?;
            resolver.flush().context("writing alias store")?;

            for (star, result) in stars.iter().zip(results) {
                match result {
                    Ok(Resolution::Resolved { main_id, via }) => println!("{} -> {} ({:?})", star.join(" | "), main_id, via),
                    Ok(Resolution::Deferred { .. }) => println!("{} -> deferred for review", star.join(" | ")),
                    Err(err) => println!("{} -> error: {}", star.join(" | "), err),
                }
            }
            write_review(&**resolver.policy(), review)?;
            println!("\n{:#?}", resolver.stats());
        }

        Commands::Ingest { registry, catalog_dir, norms, errors, params, output, array, review, summary } => {
            let norms = SolarNorms::load(norms).with_context(|| format!("loading solar norms {norms:?}"))?;
            let registry =
                CatalogRegistry::load(registry).with_context(|| format!("loading catalog registry {registry:?}"))?;
            let decimals = config.reduction.decimals;
            let tables = registry.load_tables(catalog_dir, &norms, decimals).context("loading catalogs")?;

            let errors = match errors {
                Some(path) => RepresentativeErrors::load(path, config.reduction.default_representative_error)
                    .with_context(|| format!("loading representative errors {path:?}"))?,
                None => RepresentativeErrors::new(Default::default(), config.reduction.default_representative_error),
            };
            let sources = match params {
                Some(dir) => ParamSourceTables::load_dir(dir).with_context(|| format!("loading parameters {dir:?}"))?,
                None => ParamSourceTables::new(),
            };

            let resolver = build_resolver(&cli, &config)?;
            let mut pipeline = IngestionPipeline::new(resolver, norms, config.reduction.clone())
                .with_errors(errors)
                .with_sources(sources);
            let (documents, run) = pipeline.run(&tables).context("ingestion failed")?;

            document::save_per_star(&documents, output)?;
            if let Some(path) = array {
                document::save_array(&documents, path)?;
            }
            write_review(&**pipeline.resolver().policy(), review)?;
            run.save(summary).with_context(|| format!("writing run summary {summary:?}"))?;
            run.log();
        }

        Commands::Summary { input, scale } => {
            let documents = document::load_array(input).with_context(|| format!("reading {input:?}"))?;
            let iron: ElementId = "Fe".parse()?;
            println!("{:<32} {:>8} {:>9} {:>8}", "main id", "catalogs", "elements", "Fe");
            for doc in &documents {
                let reduced = doc.reduced_abundances.get(scale.as_str());
                let elements = reduced.map_or(0, |r| r.len());
                let fe = reduced
                    .and_then(|r| r.get(&iron))
                    .and_then(|s| s.median)
                    .map_or_else(|| "-".to_string(), |v| format!("{v:.3}"));
                println!("{:<32} {:>8} {:>9} {:>8}", doc.main_id, doc.catalogs.len(), elements, fe);
            }
            println!("\n{} stars", documents.len());
        }

        Commands::Norms { norms } => {
            let norms = SolarNorms::load(norms).with_context(|| format!("loading solar norms {norms:?}"))?;
            for key in norms.keys() {
                let count = norms.scale(key)?.map_or(0, |s| s.len());
                println!("{key:<20} {count} elements");
            }
        }
    }

    Ok(())
}

type CliResolver = StarResolver<JsonAliasStore, Box<dyn ExternalResolver>, Box<dyn ResolutionPolicy>>;

/// Config file, then environment, then flags.
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading config {path:?}"))?,
        None => EngineConfig::default(),
    };
    config.apply_env();
    if cli.offline {
        config.resolver.offline = true;
    }
    if cli.interactive {
        config.resolver.interactive = true;
    }
    Ok(config)
}

fn build_resolver(cli: &Cli, config: &EngineConfig) -> Result<CliResolver> {
    if let Some(parent) = cli.store.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let store = JsonAliasStore::open(&cli.store).with_context(|| format!("opening alias store {:?}", cli.store))?;

    let external: Box<dyn ExternalResolver> = if config.resolver.offline {
        let records = match &cli.offline_records {
            Some(path) => StaticResolver::load(path).with_context(|| format!("loading offline records {path:?}"))?,
            None => StaticResolver::new(),
        };
        tracing::info!("Offline mode: external lookups use the in-memory resolver");
        Box::new(records)
    } else {
        let simbad = SimbadTapResolver::new(&config.resolver.tap_url)?;
        Box::new(RateLimited::new(simbad, config.resolver.clone()))
    };

    let policy: Box<dyn ResolutionPolicy> =
        if config.resolver.interactive { Box::new(OperatorQueue::new()) } else { Box::new(AutoCreate) };

    let resolver_config = if config.resolver.offline {
        stellar_data::ResolverConfig { interactive: config.resolver.interactive, ..stellar_data::ResolverConfig::unthrottled() }
    } else {
        config.resolver.clone()
    };
    Ok(StarResolver::new(store, external, policy, resolver_config)?)
}

fn write_review(policy: &dyn ResolutionPolicy, path: &Path) -> Result<()> {
    let queue = policy.deferred();
    if queue.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    save_review(queue, path).with_context(|| format!("writing review file {path:?}"))?;
    println!("{} stars need review, see {:?}", queue.len(), path);
    Ok(())
}
