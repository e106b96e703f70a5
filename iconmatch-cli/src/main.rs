use clap::{Parser, Subcommand};
use iconmatch::cache::{BuildReport, CacheInfo, CacheState};
use iconmatch::{
    BaseLibrary, BaseRef, FeatureCache, MatchResult, RecognitionConfig, Recognizer, Target,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "iconmatch CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract features for every base image and write the cache file.
    BuildCache,
    /// Recognize tiles against one base image.
    Recognize {
        /// Base image id (file stem in `base_dir`) or path to an image file.
        #[arg(short, long)]
        base: String,
        /// Tile images to recognize.
        #[arg(required = true)]
        targets: Vec<PathBuf>,
        /// Per-call threshold overriding the configured one.
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Find the best matching base image for each tile.
    Identify {
        #[arg(required = true)]
        targets: Vec<PathBuf>,
    },
    /// Describe the cache file named in the config.
    CacheInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    base_dir: Option<PathBuf>,
    output_path: Option<PathBuf>,
    recognition: RecognitionConfig,
}

#[derive(Debug, Serialize)]
struct IdentifyRecord {
    target: String,
    best: Option<MatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct CacheInfoRecord {
    path: PathBuf,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<CacheInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct BuildRecord {
    path: PathBuf,
    report: BuildReport,
    info: CacheInfo,
}

fn load_library(config: &Config) -> Result<BaseLibrary, Box<dyn std::error::Error>> {
    match &config.base_dir {
        Some(dir) => Ok(BaseLibrary::from_dir(dir)?),
        None => Err("base_dir must be set in the config".into()),
    }
}

fn cache_path(config: &Config) -> Result<&Path, Box<dyn std::error::Error>> {
    config
        .recognition
        .cache
        .path
        .as_deref()
        .ok_or_else(|| "recognition.cache.path must be set in the config".into())
}

/// Cache for recognition runs; `None` means features are extracted on demand.
fn prepare_cache(
    config: &Config,
    library: &BaseLibrary,
) -> Result<Option<FeatureCache>, Box<dyn std::error::Error>> {
    let settings = &config.recognition;
    let Some(path) = settings.cache.path.as_deref() else {
        return Ok(None);
    };
    if !settings.mode.uses_features() {
        return Ok(None);
    }
    let params = settings.cache_params();
    if settings.cache.rebuild_if_stale {
        return Ok(Some(FeatureCache::ensure(path, library, &params)?));
    }
    Ok(match FeatureCache::open(path, &params) {
        CacheState::Ready(cache) => Some(cache),
        CacheState::Stale(_) => {
            tracing::warn!(path = %path.display(), "cache stale, extracting on demand");
            None
        }
        CacheState::Missing => None,
        CacheState::Corrupt(err) => {
            tracing::warn!(path = %path.display(), error = %err, "cache unreadable, extracting on demand");
            None
        }
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("iconmatch=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }
    let Some(command) = cli.command else {
        return Err("a subcommand is required (build-cache, recognize, identify, cache-info)".into());
    };

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    config.recognition.validate()?;

    let json = match command {
        Command::BuildCache => {
            let library = load_library(&config)?;
            let path = cache_path(&config)?;
            let (cache, report) =
                FeatureCache::build_with_report(&library, &config.recognition.cache_params())?;
            cache.save(path)?;
            serde_json::to_string_pretty(&BuildRecord {
                path: path.to_path_buf(),
                report,
                info: cache.info(),
            })?
        }
        Command::Recognize {
            base,
            targets,
            threshold,
        } => {
            let library = match config.base_dir {
                Some(_) => Some(load_library(&config)?),
                None => None,
            };
            let cache = match &library {
                Some(library) => prepare_cache(&config, library)?,
                None => None,
            };
            let mut settings = config.recognition.clone();
            if let Some(threshold) = threshold {
                settings.threshold = threshold;
            }
            let mut recognizer = Recognizer::new(settings)?;
            if let Some(library) = &library {
                recognizer = recognizer.with_library(library);
            }
            if let Some(cache) = &cache {
                recognizer = recognizer.with_cache(cache);
            }

            let base_path = Path::new(&base);
            let base_ref = if library.as_ref().is_some_and(|l| l.contains(&base)) {
                BaseRef::Id(&base)
            } else if base_path.is_file() {
                BaseRef::Path(base_path)
            } else {
                return Err(format!("base {base} is neither a library id nor an image file").into());
            };
            let targets: Vec<Target<'_>> = targets.iter().map(|p| Target::Path(p)).collect();
            let results = recognizer.batch_recognize(base_ref, &targets);
            serde_json::to_string_pretty(&results)?
        }
        Command::Identify { targets } => {
            let library = load_library(&config)?;
            let cache = prepare_cache(&config, &library)?;
            let mut recognizer = Recognizer::new(config.recognition.clone())?.with_library(&library);
            if let Some(cache) = &cache {
                recognizer = recognizer.with_cache(cache);
            }
            let records: Vec<IdentifyRecord> = targets
                .iter()
                .map(|path| {
                    let outcome = Target::Path(path)
                        .decode()
                        .and_then(|image| recognizer.identify(&image));
                    match outcome {
                        Ok(best) => IdentifyRecord {
                            target: display_name(path),
                            best: best.map(|b| b.with_candidate_name(Some(display_name(path)))),
                            error: None,
                        },
                        Err(err) => IdentifyRecord {
                            target: display_name(path),
                            best: None,
                            error: Some(err.to_string()),
                        },
                    }
                })
                .collect();
            serde_json::to_string_pretty(&records)?
        }
        Command::CacheInfo => {
            let path = cache_path(&config)?;
            let record = match FeatureCache::open(path, &config.recognition.cache_params()) {
                CacheState::Ready(cache) => CacheInfoRecord {
                    path: path.to_path_buf(),
                    state: "ready",
                    info: Some(cache.info()),
                    error: None,
                },
                CacheState::Stale(cache) => CacheInfoRecord {
                    path: path.to_path_buf(),
                    state: "stale",
                    info: Some(cache.info()),
                    error: None,
                },
                CacheState::Missing => CacheInfoRecord {
                    path: path.to_path_buf(),
                    state: "missing",
                    info: None,
                    error: None,
                },
                CacheState::Corrupt(err) => CacheInfoRecord {
                    path: path.to_path_buf(),
                    state: "corrupt",
                    info: None,
                    error: Some(err.to_string()),
                },
            };
            serde_json::to_string_pretty(&record)?
        }
    };

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
