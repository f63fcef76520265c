///
/// modlink CLI - Native module descriptor tooling
///
/// Provides commands for working with descriptor files:
/// - modlink inspect <path>: List the symbols of a descriptor (or a directory of them)
/// - modlink link <file>: Dry-run link a descriptor against a host config
/// - modlink encode <file>: Re-emit a descriptor in canonical form
///

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::Level;

use modlink::descriptor::render_rows;
use modlink::{
    Binding, CallError, DescriptorSource, DiagnosticReporter, HostConfig, ModuleDescriptor, ModuleRegistry,
    NativeFn, NativeModule, SymbolEntry, Value, VersionGuard,
};

const DESCRIPTOR_EXTENSION: &str = "desc";

#[derive(Parser)]
#[command(name = "modlink")]
#[command(author, version, about = "Native module descriptor tooling", long_about = None)]
struct Cli {
    /// Log every linkage stage to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the symbols a descriptor exports
    Inspect {
        /// Descriptor file, or a directory of .desc files
        path: PathBuf,

        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },

    /// Link a descriptor against a host with placeholder callables
    Link {
        /// Descriptor file
        file: PathBuf,

        /// Host config (modlink.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Minimum runtime version the module claims to need
        #[arg(long)]
        requires: Option<u32>,
    },

    /// Re-emit a descriptor in canonical form
    Encode {
        /// Descriptor file
        file: PathBuf,
    },
}

#[derive(Serialize)]
struct SymbolSummary {
    name: String,
    kind: &'static str,
    signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    slot: Option<usize>,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    match cli.command {
        Commands::Inspect { path, json } => {
            inspect_path(&path, json);
        }
        Commands::Link {
            file,
            config,
            requires,
        } => {
            link_file(&file, config.as_deref(), requires);
        }
        Commands::Encode { file } => {
            encode_file(&file);
        }
    }
}

fn load_source(path: &Path) -> DescriptorSource {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error reading file: {}", e);
            std::process::exit(1);
        }
    };

    match DescriptorSource::from_bytes(display_name(path), &bytes) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn decode_source(source: &DescriptorSource) -> Option<ModuleDescriptor> {
    match source.decode() {
        Ok(descriptor) => Some(descriptor),
        Err(e) => {
            DiagnosticReporter::new(source).report(&module_name(&source.name), &e);
            None
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn module_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}

fn inspect_path(path: &Path, json: bool) {
    if path.is_file() {
        if !inspect_file(path, json) {
            std::process::exit(1);
        }
    } else if path.is_dir() {
        inspect_directory(path, json);
    } else {
        eprintln!("Error: {} does not exist", path.display());
        std::process::exit(1);
    }
}

fn inspect_file(path: &Path, json: bool) -> bool {
    let source = load_source(path);
    let Some(descriptor) = decode_source(&source) else {
        return false;
    };

    if json {
        match serde_json::to_string_pretty(&summarize(&descriptor)) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing listing: {}", e);
                return false;
            }
        }
    } else {
        print!("{}", render_listing(&source.name, &descriptor));
    }
    true
}

fn inspect_directory(path: &Path, json: bool) {
    let mut inspected = 0;
    let mut errors = 0;

    for entry in walkdir::WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let file_path = entry.path();
        if file_path.extension().map(|e| e == DESCRIPTOR_EXTENSION).unwrap_or(false) {
            if !inspect_file(file_path, json) {
                errors += 1;
            }
            inspected += 1;
        }
    }

    eprintln!("Inspected {} descriptors, {} with errors", inspected, errors);

    if errors > 0 {
        std::process::exit(1);
    }
}

fn summarize(descriptor: &ModuleDescriptor) -> Vec<SymbolSummary> {
    let mut functions = descriptor.functions();
    descriptor
        .symbols()
        .iter()
        .filter_map(|entry| match entry {
            SymbolEntry::Function(_) => functions.next().map(|f| SymbolSummary {
                name: f.entry.name.clone(),
                kind: "function",
                signature: f.entry.signature.to_string(),
                slot: Some(f.slot),
            }),
            SymbolEntry::Object(o) => Some(SymbolSummary {
                name: o.name.clone(),
                kind: "object",
                signature: o.ty.to_string(),
                slot: None,
            }),
            SymbolEntry::Sentinel => None,
        })
        .collect()
}

fn render_listing(name: &str, descriptor: &ModuleDescriptor) -> String {
    let mut out = format!(
        "{}: {} symbol(s), {} linkage slot(s)\n",
        name,
        descriptor.symbols().len(),
        descriptor.expected_slots()
    );
    for symbol in summarize(descriptor) {
        match symbol.slot {
            Some(slot) => out.push_str(&format!("  fn {}{} [slot {}]\n", symbol.name, symbol.signature, slot)),
            None => out.push_str(&format!("  const {}: {}\n", symbol.name, symbol.signature)),
        }
    }
    out
}

fn unbound(_args: &[Value]) -> Result<Value, CallError> {
    Err(CallError::Native("placeholder callable invoked".to_string()))
}

fn link_file(path: &Path, config: Option<&Path>, requires: Option<u32>) {
    let config = match config {
        Some(config_path) => match HostConfig::load(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        },
        None => HostConfig::default(),
    };

    let source = load_source(path);
    let Some(descriptor) = decode_source(&source) else {
        std::process::exit(1);
    };

    let name = module_name(&source.name);
    let rows: Vec<&str> = source.rows().iter().map(String::as_str).collect();
    let callables: Vec<NativeFn> = vec![unbound as NativeFn; descriptor.function_count()];
    let guard = VersionGuard::requires(requires.unwrap_or(config.runtime_version));

    let registry = ModuleRegistry::from_config(config);
    let module = NativeModule {
        name: &name,
        descriptor: &rows,
        callables: &callables,
        guard,
    };

    match registry.register(module) {
        Ok(mapping) => {
            println!(
                "linked {} against runtime {} ({})",
                name,
                registry.runtime_version(),
                guard
            );
            for (symbol, binding) in mapping.iter() {
                match binding {
                    Binding::Function { signature, slot, .. } => {
                        println!("  {}: function {} [slot {}]", symbol, signature, slot)
                    }
                    Binding::Object { ty, value } => println!("  {}: object {} = {}", symbol, ty, value),
                }
            }
        }
        Err(e) => {
            DiagnosticReporter::new(&source).report(&e.module, &e.source);
            std::process::exit(1);
        }
    }
}

fn encode_file(path: &Path) {
    let source = load_source(path);
    let Some(descriptor) = decode_source(&source) else {
        std::process::exit(1);
    };
    print!("{}", render_rows(&descriptor.encode()));
}
