//! docintel CLI
//!
//! Entry point for the `docintel` command-line tool.

use std::fmt::Display;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use docintel_corpus::client::{AzureBlobStore, ContainerRef, DocumentIntelligenceClient, HttpTransport, Transport};
use docintel_corpus::config::{ConfigError, EffectiveConfig, LaneConfig};
use docintel_corpus::manifest::ManifestBuilder;
use docintel_corpus::poller::AsyncJobPoller;
use docintel_corpus::summary::ExitCode;
use docintel_corpus::workflow::{self, AnalyzeOptions, BuildOptions, DocTypeSource, WorkflowError};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::warn;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = ".docintel/config.toml";

#[derive(Parser)]
#[command(name = "docintel")]
#[command(about = "Build, upload and train document-classifier corpora", version)]
struct Cli {
    /// Path to config file (default: .docintel/config.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the training root and show the manifests it yields
    Manifest {
        /// Training root (overrides TRAINING_DOCUMENTS)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Minimum eligible files per category
        #[arg(long)]
        min_files: Option<usize>,

        /// Write <category>.jsonl into the training root
        #[arg(long)]
        write: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Upload the training corpus and its manifests to blob storage
    Upload {
        #[arg(long)]
        root: Option<PathBuf>,

        /// Container SAS URL (overrides AZURE_STORAGE_CONTAINER_SAS_URL)
        #[arg(long)]
        container: Option<String>,

        #[arg(long)]
        min_files: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Run layout analysis on every eligible file and write <file>.ocr.json
    AnalyzeLayout {
        #[arg(long)]
        root: Option<PathBuf>,

        /// Keep documents whose sidecar already exists
        #[arg(long)]
        skip_existing: bool,

        #[arg(long)]
        json: bool,
    },

    /// Train a classifier from the uploaded corpus
    BuildClassifier {
        /// Classifier ID (default: CLASSIFIER_ID or a random UUID)
        #[arg(long)]
        classifier_id: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Classifier to extend
        #[arg(long)]
        base_classifier_id: Option<String>,

        #[arg(long)]
        container: Option<String>,

        /// How document types are located in the container
        #[arg(long, value_enum, default_value_t = SourceArg::FileList)]
        source: SourceArg,

        #[arg(long)]
        json: bool,
    },

    /// Classify every file of the testing directory
    Classify {
        /// Directory of documents (overrides TESTING_DOCUMENTS)
        #[arg(long)]
        dir: Option<PathBuf>,

        #[arg(long)]
        classifier_id: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// List the classifiers of the resource
    ListClassifiers {
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration with secrets redacted
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    /// <DocType>.jsonl file lists at the container root
    FileList,
    /// Every blob under <DocType>/
    Prefix,
}

impl From<SourceArg> for DocTypeSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::FileList => DocTypeSource::FileList,
            SourceArg::Prefix => DocTypeSource::Prefix,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {} ({})", e, e.failure_kind().description());
            e.exit_code()
        }
    };
    process::exit(code.as_i32());
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode, WorkflowError> {
    let config_path = cli.config.clone();

    match cli.command {
        Commands::Manifest {
            root,
            min_files,
            write,
            json,
        } => {
            let overrides = cli_layer(&[
                ("root_directory", root.map(path_value)),
                ("manifest.min_files_per_category", min_files.map(|n| json!(n))),
            ]);
            let (_, lane) = load_config(config_path, overrides)?;
            let builder = ManifestBuilder::from_config(&lane)?;
            let output = builder.build()?;
            if write {
                for path in builder.write_manifests(&output)? {
                    eprintln!("Wrote {}", path.display());
                }
            }
            emit(&output, json);
            Ok(ExitCode::Success)
        }

        Commands::Upload {
            root,
            container,
            min_files,
            json,
        } => {
            let overrides = cli_layer(&[
                ("root_directory", root.map(path_value)),
                ("container_ref", container.map(Value::String)),
                ("manifest.min_files_per_category", min_files.map(|n| json!(n))),
            ]);
            let (_, lane) = load_config(config_path, overrides)?;
            let builder = ManifestBuilder::from_config(&lane)?;
            let container = container_ref(&lane)?;
            let store = AzureBlobStore::new(transport(&lane)?, container.clone());

            let report = workflow::upload_corpus(&builder, &store, &container.to_string())?;
            emit(&report, json);
            Ok(exit_code(report.exit_code))
        }

        Commands::AnalyzeLayout {
            root,
            skip_existing,
            json,
        } => {
            let overrides = cli_layer(&[("root_directory", root.map(path_value))]);
            let (_, lane) = load_config(config_path, overrides)?;
            let builder = ManifestBuilder::from_config(&lane)?;
            let client = DocumentIntelligenceClient::from_config(transport(&lane)?, &lane)?;
            let options = AnalyzeOptions {
                model_id: lane.layout_model_id.clone(),
                skip_existing,
            };

            let report = workflow::analyze_layout(&builder, &client, &poller(&lane)?, &options)?;
            emit(&report, json);
            Ok(exit_code(report.exit_code))
        }

        Commands::BuildClassifier {
            classifier_id,
            description,
            base_classifier_id,
            container,
            source,
            json,
        } => {
            let overrides = cli_layer(&[
                ("classifier_id", classifier_id.map(Value::String)),
                ("classifier_description", description.map(Value::String)),
                ("base_classifier_id", base_classifier_id.map(Value::String)),
                ("container_ref", container.map(Value::String)),
            ]);
            let (_, lane) = load_config(config_path, overrides)?;
            let transport = transport(&lane)?;
            let client = DocumentIntelligenceClient::from_config(transport.clone(), &lane)?;
            let container = container_ref(&lane)?;
            let store = AzureBlobStore::new(transport, container.clone());
            let options = BuildOptions {
                classifier_id: lane.classifier_id.clone(),
                description: lane.classifier_description.clone(),
                base_classifier_id: lane.base_classifier_id.clone(),
                source: source.into(),
            };

            let report =
                workflow::build_classifier(&client, &store, &container, &poller(&lane)?, &options)?;
            emit(&report, json);
            Ok(exit_code(report.exit_code))
        }

        Commands::Classify {
            dir,
            classifier_id,
            json,
        } => {
            let overrides = cli_layer(&[
                ("testing_directory", dir.map(path_value)),
                ("classifier_id", classifier_id.map(Value::String)),
            ]);
            let (_, lane) = load_config(config_path, overrides)?;
            let dir = lane.require_testing_directory()?.clone();
            let classifier_id = lane.require_classifier_id()?.to_string();
            let client = DocumentIntelligenceClient::from_config(transport(&lane)?, &lane)?;

            let report =
                workflow::classify_documents(&dir, &client, &poller(&lane)?, &classifier_id)?;
            emit(&report, json);
            Ok(exit_code(report.exit_code))
        }

        Commands::ListClassifiers { json } => {
            let (_, lane) = load_config(config_path, None)?;
            let client = DocumentIntelligenceClient::from_config(transport(&lane)?, &lane)?;
            let listing = workflow::list_classifiers(&client)?;
            emit(&listing, json);
            Ok(ExitCode::Success)
        }

        Commands::Config => {
            let (effective, _) = load_config(config_path, None)?;
            match effective.to_json() {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Error serializing output: {}", e);
                    return Ok(ExitCode::Config);
                }
            }
            Ok(ExitCode::Success)
        }
    }
}

/// Merge defaults, config file, environment and CLI flags
fn load_config(
    config_path: Option<PathBuf>,
    cli_overrides: Option<Value>,
) -> Result<(EffectiveConfig, LaneConfig), ConfigError> {
    let path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let env = EffectiveConfig::env_layer(|var| std::env::var(var).ok());
    let effective = EffectiveConfig::build(Some(&path), env, cli_overrides)?;
    let lane = effective.lane_config()?;
    Ok((effective, lane))
}

/// CLI layer from the flags that were given; dotted keys nest
fn cli_layer(flags: &[(&str, Option<Value>)]) -> Option<Value> {
    let mut root = Map::new();
    for (key, value) in flags {
        let Some(value) = value else { continue };
        match key.split_once('.') {
            Some((section, field)) => {
                let entry = root
                    .entry(section.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(map) = entry {
                    map.insert(field.to_string(), value.clone());
                }
            }
            None => {
                root.insert(key.to_string(), value.clone());
            }
        }
    }
    if root.is_empty() {
        None
    } else {
        Some(Value::Object(root))
    }
}

fn container_ref(lane: &LaneConfig) -> Result<ContainerRef, ConfigError> {
    ContainerRef::parse(lane.require_container_ref()?)
        .map_err(|e| ConfigError::ValidationError(e.to_string()))
}

fn path_value(path: PathBuf) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}

fn transport(lane: &LaneConfig) -> Result<Arc<dyn Transport>, WorkflowError> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&lane.http)?);
    Ok(transport)
}

/// Poller with the configured policy; Ctrl-C stops it at the next attempt
fn poller(lane: &LaneConfig) -> Result<AsyncJobPoller, ConfigError> {
    let policy = lane.retry_policy();
    policy
        .validate()
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!(error = %e, "cannot install Ctrl-C handler");
    }
    Ok(AsyncJobPoller::new(policy).with_cancel_flag(cancel))
}

fn emit<T: Serialize + Display>(report: &T, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(out) => println!("{}", out),
            Err(e) => eprintln!("Error serializing output: {}", e),
        }
    } else {
        print!("{}", report);
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from_i32(code).unwrap_or(ExitCode::JobFailed)
}
