use clap::Parser;
use std::path::PathBuf;
use std::rc::Rc;

use modpack_rs::{bundle, BundleOptions, OverrideResolution, ResolveOverride};

/// modpack: Bundle an ES module or CommonJS module graph into a single JavaScript file
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the entry module
    #[clap(short, long)]
    pub input: PathBuf,

    /// Path to the bundle file to be created
    #[clap(short, long)]
    pub output: PathBuf,

    /// Development bundle: modules keyed by path, no minification
    #[clap(long)]
    pub dev: bool,

    /// Override whether the bundle is minified
    #[clap(long)]
    pub minify: Option<bool>,

    /// Emit a CommonJS bundle instead of an ES module
    #[clap(long)]
    pub commonjs: bool,

    /// Redirect a specifier to a file, as <specifier>=<path>. May be repeated
    #[clap(long, value_parser = parse_alias)]
    pub alias: Vec<(String, PathBuf)>,

    /// Keep a specifier out of the bundle. May be repeated
    #[clap(long)]
    pub external: Vec<String>,

    /// Log every module as it is bundled
    #[clap(short, long)]
    pub verbose: bool,
}

fn parse_alias(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((specifier, path)) if !specifier.is_empty() && !path.is_empty() => {
            Ok((specifier.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected <specifier>=<path>, got \"{}\"", value)),
    }
}

/// Builds the resolver override from `--alias` and `--external`.
fn resolve_override(
    aliases: Vec<(String, PathBuf)>,
    externals: Vec<String>,
) -> anyhow::Result<Option<Rc<dyn ResolveOverride>>> {
    if aliases.is_empty() && externals.is_empty() {
        return Ok(None);
    }

    // Alias targets are relative to where modpack runs, not to the importer
    let cwd = std::env::current_dir()?;
    let aliases: Vec<(String, PathBuf)> = aliases
        .into_iter()
        .map(|(specifier, path)| (specifier, cwd.join(path)))
        .collect();

    let resolve = move |specifier: String, _parent: Option<PathBuf>, _commonjs: bool| {
        let resolution = if externals.contains(&specifier) {
            Some(OverrideResolution::Skip)
        } else {
            aliases
                .iter()
                .find(|(alias, _)| *alias == specifier)
                .map(|(_, path)| OverrideResolution::Path(path.clone()))
        };
        async move { Ok::<_, anyhow::Error>(resolution) }
    };

    Ok(Some(Rc::new(resolve)))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let options = BundleOptions {
        resolve_override: resolve_override(args.alias, args.external)?,
        minify: args.minify,
        debug: args.dev,
        output_commonjs: args.commonjs,
        ..Default::default()
    };

    bundle(&args.input, &args.output, options).await
}

#[tokio::main]
async fn main() {
    let args: Args = Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(err) = run(args).await {
        eprintln!("Bundling failed: {:#}", err);
        std::process::exit(1);
    }
}
