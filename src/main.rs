//! PromptFlow CLI Entry Point
//!
//! Provides command-line access to workflow runs and the prompt store.
//!
//! # Usage
//!
//! ```bash
//! # Run a workflow and print the step log
//! promptflow run prompt-builder.yaml --input "A haiku about rust"
//!
//! # Run a workflow and store the result as a new prompt
//! promptflow run prompt-builder.yaml --input "..." --select assemble
//!
//! # Register and run a single prompt
//! promptflow register hello-world hello.txt --mode local_llm
//! promptflow exec hello-world --var name=Ada
//!
//! # Embed stored prompts and search them
//! promptflow embed
//! promptflow search "short poems" --top 3
//!
//! # Talk to an agent built on a stored prompt, then export the prompt
//! promptflow chat tutor-1 generated-f4b8bd61 --input "What is a lifetime?"
//! promptflow export-manifest generated-f4b8bd61
//! ```

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use log::{error, info, warn};
use serde_json::{json, Value};

use promptflow::backend::{http_client, BackendSet};
use promptflow::catalog::{ExecutionMode, ModuleCatalog, YamlFileSource};
use promptflow::chat::{AgentChat, ChatRequest};
use promptflow::config::Settings;
use promptflow::embedding::{OllamaEmbedder, StoreEmbeddingService};
use promptflow::execution::{
    ArtifactAssembler, BackendRouter, ResultSelector, RunRequest, RunResult, SingleRunner,
    WorkflowEngine,
};
use promptflow::manifest::{export_manifest, write_manifest, DEFAULT_MANIFEST_DIR};
use promptflow::registry::{PromptRegistry, DEFAULT_VERSION};
use promptflow::store::{FileStore, KeyValueStore};
use promptflow::workflow::load_definition;
use promptflow::{APP_NAME, VERSION};

/// Default number of search results.
const DEFAULT_TOP_K: usize = 5;

/// Subcommand selected on the command line.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Run,
    Validate,
    Exec,
    Batch,
    Register,
    Embed,
    Search,
    Modules,
    Chat,
    ExportManifest,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "run" => Some(Self::Run),
            "validate" => Some(Self::Validate),
            "exec" => Some(Self::Exec),
            "batch" => Some(Self::Batch),
            "register" => Some(Self::Register),
            "embed" => Some(Self::Embed),
            "search" => Some(Self::Search),
            "modules" => Some(Self::Modules),
            "chat" => Some(Self::Chat),
            "export-manifest" => Some(Self::ExportManifest),
            _ => None,
        }
    }
}

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    command: Command,
    positional: Vec<String>,
    config_path: Option<PathBuf>,
    input: Option<String>,
    select: ResultSelector,
    version_tag: String,
    vars: Vec<(String, String)>,
    mode: Option<String>,
    top_k: usize,
    out_dir: PathBuf,
    reset: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: Command::Modules,
            positional: Vec::new(),
            config_path: None,
            input: None,
            select: ResultSelector::StepLog,
            version_tag: DEFAULT_VERSION.to_string(),
            vars: Vec::new(),
            mode: None,
            top_k: DEFAULT_TOP_K,
            out_dir: PathBuf::from(DEFAULT_MANIFEST_DIR),
            reset: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    eprintln!();
    eprintln!("{} v{}", APP_NAME.bold(), VERSION);
    eprintln!("{}", "Prompt Module Workflow Engine".dimmed());
    eprintln!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: promptflow [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("Commands:");
    println!("  run <WORKFLOW>            Run a workflow file");
    println!("  validate <WORKFLOW>       Check a workflow against the catalog");
    println!("  exec <PROMPT_ID>          Run one stored prompt");
    println!("  batch <REQUESTS_JSON>     Run a list of stored prompt requests");
    println!("  register <PROMPT_ID> <FILE>  Store a prompt version");
    println!("  embed                     Embed stored prompts that lack embeddings");
    println!("  search <QUERY>            Find similar stored prompts");
    println!("  modules                   List catalog modules");
    println!("  chat <AGENT_ID> <PROMPT_ID>  Talk to an agent built on a stored prompt");
    println!("  export-manifest <PROMPT_ID>  Write a stored prompt as a JSON manifest");
    println!();
    println!("Options:");
    println!("  --config PATH       Settings YAML file");
    println!("  --input TEXT        Initial input for run");
    println!("  --input-file PATH   Read the initial input from a file");
    println!("  --select SHAPE      log | context | entry:KEY | assemble (default: log)");
    println!("  --tag VERSION       Prompt version for exec/register (default: {})", DEFAULT_VERSION);
    println!("  --var KEY=VALUE     Template value for exec (repeatable)");
    println!("  --mode MODE         Execution mode stored by register");
    println!("  --top N             Search results (default: {})", DEFAULT_TOP_K);
    println!("  --out DIR           Manifest directory (default: {})", DEFAULT_MANIFEST_DIR);
    println!("  --reset             Clear the agent's memory before chatting");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  promptflow run prompt-builder.yaml --input \"A haiku about rust\"");
    println!("  promptflow exec hello-world --var name=Ada");
    println!("  promptflow search \"short poems\" --top 3");
}

/// Returns the value following an option.
fn option_value<'a>(args: &'a [String], i: &mut usize, name: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires a value", name))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut command: Option<Command> = None;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--reset" => {
                config.reset = true;
            }
            "--out" => {
                config.out_dir = PathBuf::from(option_value(args, &mut i, "--out")?);
            }
            "--config" => {
                config.config_path = Some(PathBuf::from(option_value(args, &mut i, "--config")?));
            }
            "--input" => {
                config.input = Some(option_value(args, &mut i, "--input")?.to_string());
            }
            "--input-file" => {
                let path = option_value(args, &mut i, "--input-file")?;
                let content = fs::read_to_string(path)
                    .map_err(|e| format!("Could not read input file '{}': {}", path, e))?;
                config.input = Some(content);
            }
            "--select" => {
                let value = option_value(args, &mut i, "--select")?;
                config.select = ResultSelector::parse(value)
                    .ok_or_else(|| format!("Invalid --select value: {}", value))?;
            }
            "--tag" => {
                config.version_tag = option_value(args, &mut i, "--tag")?.to_string();
            }
            "--var" => {
                let value = option_value(args, &mut i, "--var")?;
                let (key, val) = value
                    .split_once('=')
                    .ok_or_else(|| format!("--var expects KEY=VALUE, got: {}", value))?;
                config.vars.push((key.trim().to_string(), val.to_string()));
            }
            "--mode" => {
                config.mode = Some(option_value(args, &mut i, "--mode")?.to_string());
            }
            "--top" => {
                let value = option_value(args, &mut i, "--top")?;
                config.top_k = value
                    .parse()
                    .map_err(|_| format!("Invalid --top value: {}", value))?;
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if command.is_none() {
                    command = Some(
                        Command::parse(arg).ok_or_else(|| format!("Unknown command: {}", arg))?,
                    );
                } else {
                    config.positional.push(arg.clone());
                }
            }
        }
        i += 1;
    }

    config.command = command.ok_or_else(|| "No command given".to_string())?;

    let required = match config.command {
        Command::Run
        | Command::Validate
        | Command::Exec
        | Command::Batch
        | Command::Search
        | Command::ExportManifest => 1,
        Command::Register | Command::Chat => 2,
        Command::Embed | Command::Modules => 0,
    };
    if config.positional.len() != required {
        return Err(format!(
            "{:?} expects {} argument(s), got {}",
            config.command,
            required,
            config.positional.len()
        ));
    }

    Ok(config)
}

/// Services shared by the commands.
struct App {
    settings: Settings,
    catalog: Arc<ModuleCatalog>,
    store: Arc<dyn KeyValueStore>,
    backends: BackendSet,
    embeddings: Arc<StoreEmbeddingService<OllamaEmbedder>>,
}

impl App {
    async fn build(settings: Settings) -> Result<Self, Box<dyn std::error::Error>> {
        let catalog = Arc::new(ModuleCatalog::new(YamlFileSource::new(&settings.catalog_path)));
        catalog.load_all();

        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&settings.store_path).await?);
        let backends = BackendSet::from_settings(&settings.backends)?;

        let client = http_client(settings.backends.request_timeout_secs)?;
        let embedder = OllamaEmbedder::new(client, &settings.backends);
        let embeddings = Arc::new(StoreEmbeddingService::new(Arc::clone(&store), embedder));

        Ok(Self {
            settings,
            catalog,
            store,
            backends,
            embeddings,
        })
    }

    fn engine(&self) -> WorkflowEngine {
        let assembler = ArtifactAssembler::new(Arc::clone(&self.store), self.embeddings.clone());

        let mut engine = WorkflowEngine::new(Arc::clone(&self.catalog), self.backends.clone())
            .with_router(BackendRouter::new(self.settings.routing.clone()))
            .with_assembler(assembler)
            .with_preflight(true);

        if let Some(secs) = self.settings.run_timeout_secs {
            engine = engine.with_run_timeout(Duration::from_secs(secs));
        }
        engine
    }

    fn registry(&self) -> PromptRegistry {
        PromptRegistry::new(Arc::clone(&self.store))
    }
}

/// Prints a value as pretty JSON on stdout.
fn print_json(value: &impl serde::Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_workflow(app: &App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let definition = load_definition(&config.positional[0])?;
    let input = config
        .input
        .clone()
        .ok_or("run requires --input or --input-file")?;

    let output = app
        .engine()
        .run(&definition, input, config.select.clone())
        .await?;

    eprintln!("{} workflow '{}'", "Completed".green().bold(), definition.label());
    print_json(&output)
}

fn validate_workflow(app: &App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let definition = load_definition(&config.positional[0])?;
    app.engine().validate(&definition)?;

    eprintln!(
        "{} workflow '{}' ({} steps)",
        "Valid".green().bold(),
        definition.label(),
        definition.len()
    );
    Ok(())
}

async fn exec_prompt(app: &App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = RunRequest::new(config.positional[0].clone(), config.version_tag.clone());
    for (key, value) in &config.vars {
        request = request.with_input(key.clone(), value.clone());
    }

    let runner = SingleRunner::new(app.registry(), app.backends.clone());
    let result = runner.run(&request).await?;
    print_json(&result)
}

async fn run_batch(app: &App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let path = &config.positional[0];
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Could not read batch file '{}': {}", path, e))?;
    let requests: Vec<RunRequest> = serde_json::from_str(&content)?;

    let runner = SingleRunner::new(app.registry(), app.backends.clone())
        .with_concurrency(app.settings.batch_concurrency);
    let results = runner.run_batch(requests).await?;

    let report = batch_report(&results);

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        warn!("{} of {} requests failed", failed, results.len());
    }
    print_json(&report)
}

/// One `{"status": "ok" | "error", ...}` object per batch request.
fn batch_report(results: &[promptflow::Result<RunResult>]) -> Vec<Value> {
    results
        .iter()
        .map(|result| match result {
            Ok(result) => json!({"status": "ok", "result": result}),
            Err(e) => json!({"status": "error", "error": e.to_string()}),
        })
        .collect()
}

async fn chat_with_agent(app: &App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let agent_id = &config.positional[0];
    let chat = AgentChat::new(Arc::clone(&app.store), app.backends.clone());

    if config.reset {
        chat.reset(agent_id).await?;
        eprintln!("{} memory of agent '{}'", "Cleared".green().bold(), agent_id);
    }

    let Some(input) = config.input.clone() else {
        if config.reset {
            return Ok(());
        }
        return Err("chat requires --input or --input-file".into());
    };

    let request = ChatRequest::new(agent_id.clone(), config.positional[1].clone(), input)
        .with_version(config.version_tag.clone());
    let reply = chat.send(&request).await?;

    eprintln!("{} turn {}", agent_id.cyan(), reply.turns);
    println!("{}", reply.response);
    Ok(())
}

async fn export_prompt_manifest(app: &App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let prompt_id = &config.positional[0];
    let manifest = export_manifest(&app.registry(), prompt_id, &config.version_tag, APP_NAME).await?;
    let path = write_manifest(&manifest, &config.out_dir).await?;

    eprintln!("{} {}", "Exported".green().bold(), path.display());
    Ok(())
}

async fn register_prompt(app: &App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let prompt_id = &config.positional[0];
    let path = &config.positional[1];
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Could not read prompt file '{}': {}", path, e))?;

    let mut metadata = json!({ "source": "cli" });
    if let Some(mode) = &config.mode {
        let mode = ExecutionMode::from_tag(mode);
        metadata["execution_mode"] = json!(mode.as_tag());
    }

    let key = app
        .registry()
        .register(prompt_id, &content, Some(config.version_tag.as_str()), metadata)
        .await?;

    eprintln!("{} {}", "Registered".green().bold(), key);
    Ok(())
}

async fn embed_prompts(app: &App) -> Result<(), Box<dyn std::error::Error>> {
    let report = app.embeddings.backfill().await?;

    eprintln!(
        "{} {} generated, {} skipped, {} failed",
        "Embeddings:".bold(),
        report.generated.to_string().green(),
        report.skipped,
        if report.failed > 0 {
            report.failed.to_string().red()
        } else {
            report.failed.to_string().normal()
        }
    );
    Ok(())
}

async fn search_prompts(app: &App, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let hits = app
        .embeddings
        .search(&config.positional[0], config.top_k)
        .await?;

    if hits.is_empty() {
        info!("No embeddings found; run `promptflow embed` first");
    }
    print_json(&hits)
}

fn list_modules(app: &App) {
    let modules = app.catalog.load_all();
    if modules.is_empty() {
        warn!(
            "No modules loaded from {}",
            app.settings.catalog_path.display()
        );
        return;
    }

    for module in modules {
        let mode = module
            .execution_mode
            .as_ref()
            .map(|m| m.as_tag())
            .unwrap_or("-");
        let routed = app.settings.routing.route(&module.id);

        println!(
            "{:48} {:18} {:18} {}",
            module.id.cyan(),
            mode,
            routed.to_string(),
            module.display_name()
        );
    }
}

/// Main application entry point.
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);

    // Print banner
    print_banner();

    let settings = Settings::load(config.config_path.as_deref()).map_err(|e| {
        error!("Failed to load settings: {}", e);
        e
    })?;
    info!("Catalog: {}", settings.catalog_path.display());
    info!("Store: {}", settings.store_path.display());

    let app = App::build(settings).await?;

    match config.command {
        Command::Run => run_workflow(&app, &config).await,
        Command::Validate => validate_workflow(&app, &config),
        Command::Exec => exec_prompt(&app, &config).await,
        Command::Batch => run_batch(&app, &config).await,
        Command::Register => register_prompt(&app, &config).await,
        Command::Embed => embed_prompts(&app).await,
        Command::Search => search_prompts(&app, &config).await,
        Command::Modules => {
            list_modules(&app);
            Ok(())
        }
        Command::Chat => chat_with_agent(&app, &config).await,
        Command::ExportManifest => export_prompt_manifest(&app, &config).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            let mut cause = e.source();
            while let Some(inner) = cause {
                eprintln!("  {} {}", "caused by:".dimmed(), inner);
                cause = inner.source();
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("promptflow")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_parse_run() {
        let config = parse_arguments(&args(&[
            "run",
            "wf.yaml",
            "--input",
            "hello",
            "--select",
            "entry:m1",
        ]))
        .unwrap();

        assert_eq!(config.command, Command::Run);
        assert_eq!(config.positional, vec!["wf.yaml"]);
        assert_eq!(config.input.as_deref(), Some("hello"));
        assert_eq!(config.select, ResultSelector::Entry("m1".to_string()));
    }

    #[test]
    fn test_parse_exec_vars() {
        let config = parse_arguments(&args(&[
            "exec",
            "hello-world",
            "--tag",
            "v2.0.0",
            "--var",
            "name=Ada",
            "--var",
            "greeting=a=b",
        ]))
        .unwrap();

        assert_eq!(config.version_tag, "v2.0.0");
        assert_eq!(
            config.vars,
            vec![
                ("name".to_string(), "Ada".to_string()),
                ("greeting".to_string(), "a=b".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_arguments(&args(&[])).is_err());
        assert!(parse_arguments(&args(&["launch"])).is_err());
        assert!(parse_arguments(&args(&["run"])).is_err());
        assert!(parse_arguments(&args(&["register", "only-id"])).is_err());
        assert!(parse_arguments(&args(&["search", "q", "--top", "many"])).is_err());
        assert!(parse_arguments(&args(&["modules", "--bogus"])).is_err());
        assert!(parse_arguments(&args(&["exec", "p", "--var", "novalue"])).is_err());
    }

    #[test]
    fn test_parse_defaults() {
        let config = parse_arguments(&args(&["embed", "--verbose"])).unwrap();
        assert_eq!(config.command, Command::Embed);
        assert!(config.verbose);
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert_eq!(config.version_tag, DEFAULT_VERSION);
    }

    #[test]
    fn test_parse_chat_and_export() {
        let config = parse_arguments(&args(&[
            "chat",
            "tutor-1",
            "generated-f4b8bd61",
            "--input",
            "hi",
            "--reset",
        ]))
        .unwrap();
        assert_eq!(config.command, Command::Chat);
        assert_eq!(config.positional, vec!["tutor-1", "generated-f4b8bd61"]);
        assert!(config.reset);

        let config =
            parse_arguments(&args(&["export-manifest", "hello-world", "--out", "out"])).unwrap();
        assert_eq!(config.command, Command::ExportManifest);
        assert_eq!(config.out_dir, PathBuf::from("out"));

        let config = parse_arguments(&args(&["export-manifest", "hello-world"])).unwrap();
        assert_eq!(config.out_dir, PathBuf::from(DEFAULT_MANIFEST_DIR));

        assert!(parse_arguments(&args(&["chat", "tutor-1"])).is_err());
    }

    #[test]
    fn test_batch_report_statuses() {
        use promptflow::execution::BackendCapability;

        let results = vec![
            Ok(RunResult {
                prompt_key: "prompt:greet:v1.0.0".to_string(),
                capability: BackendCapability::Passthrough,
                output: "Hi A".to_string(),
            }),
            Err(promptflow::Error::Lookup("absent:v1.0.0".to_string())),
        ];

        let report = batch_report(&results);
        assert_eq!(report[0]["status"], "ok");
        assert_eq!(report[0]["result"]["output"], "Hi A");
        assert_eq!(report[1]["status"], "error");
        assert!(report[1]["error"].as_str().unwrap().contains("absent:v1.0.0"));
    }
}
