//! viewkit CLI
//!
//! Usage:
//!   viewkit [OPTIONS] <TEMPLATE>
//!
//! Options:
//!   -c, --config <FILE>     Engine config file (TOML format)
//!   -r, --root <DIR>        Template root directory
//!       --cache-dir <DIR>   Compiled template cache directory
//!   -d, --data <FILE>       JSON object with template data
//!       --compile           Print the compiled program instead of rendering
//!   -h, --help              Print help

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use viewkit::template::SourceLoader;
use viewkit::{Component, Data, Engine, EngineConfig, RenderError, TemplateError};

#[derive(Parser)]
#[command(name = "viewkit")]
#[command(about = "Compile and render templates")]
struct Cli {
    /// Template id to render, relative to the template root
    template: String,

    /// Engine config file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Template root directory (overrides the config file)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Compiled template cache directory (overrides the config file)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// JSON file holding an object of template data
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Print the compiled program instead of rendering
    #[arg(long)]
    compile: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match EngineConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };
    if let Some(root) = &cli.root {
        config = config.with_template_root(root);
    }
    if let Some(dir) = &cli.cache_dir {
        config = config.with_cache_dir(dir);
    }

    let data = match &cli.data {
        Some(path) => match read_data(path) {
            Ok(data) => data,
            Err(message) => {
                eprintln!("Error reading data '{}': {}", path.display(), message);
                process::exit(1);
            }
        },
        None => Data::new(),
    };

    let engine = match Engine::new(&config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let result = if cli.compile {
        engine.compile(&cli.template).and_then(|program| {
            program
                .to_artifact()
                .map_err(|source| TemplateError::Serialize { source }.into())
        })
    } else {
        let view = Component::new(cli.template.as_str()).with_data(data).into_view();
        engine.render(&view)
    };

    match result {
        Ok(output) => println!("{}", output),
        Err(e) => {
            report(&engine, &cli.template, &e);
            process::exit(1);
        }
    }
}

fn read_data(path: &Path) -> Result<Data, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    match serde_json::from_str::<serde_json::Value>(&content).map_err(|e| e.to_string())? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err("expected a JSON object".to_string()),
    }
}

/// Print an error, with source context for compile errors
fn report(engine: &Engine, template: &str, error: &RenderError) {
    let Some((compile_error, failing)) = error.compile_error() else {
        eprintln!("Error: {}", error);
        return;
    };

    let name = compile_error.layout().or(failing).unwrap_or(template);
    match engine.service().directory().load(name) {
        Ok(source) => eprint!("{}", compile_error.format(&source, name)),
        Err(_) => eprintln!("Error: {}", error),
    }
}
