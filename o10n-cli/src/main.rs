//! o10n command line
//!
//! Runs the stylesheet optimizer over a rendered HTML page:
//! - critical CSS selection and injection
//! - extraction, minification, concatenation and async loading
//! - editor views selected by `--query`

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use o10n_common::{HttpFetcher, Notices, Site};
use o10n_critical::{
    CriticalConfig, CriticalCssSelector, EditorView, PredicateRegistry, ViewMode, authorize,
};
use o10n_css::{
    CacheProxy, CssOptimizer, FileCache, LightningMinifier, RawConfig, RenderContext, ServerPush,
    Services, Settings,
};
use owo_colors::OwoColorize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// o10n: server-side CSS delivery optimizer
#[derive(Parser, Debug)]
#[command(name = "o10n")]
#[command(author, version, about, long_about = None)]
#[command(after_help = r#"EXAMPLES:
    # Optimize a page and print the result
    o10n optimize page.html --config o10n.json --site-root ./public \
        --site-url https://example.com --cache-dir ./public/cache

    # Write the result to a file and use a custom cache URL
    o10n optimize page.html --config o10n.json --site-root ./public \
        --site-url https://example.com --cache-dir /var/cache/o10n \
        --cache-url https://static.example.com/o10n -o out.html

    # Open the critical CSS editor view
    o10n optimize page.html --config o10n.json --site-root ./public \
        --site-url https://example.com --cache-dir ./public/cache \
        --query 'o10n-css' --privileged

Set RUST_LOG=debug for detailed pipeline logging.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Optimize the stylesheets of an HTML page
    Optimize(OptimizeArgs),
}

#[derive(clap::Args, Debug)]
struct OptimizeArgs {
    /// HTML page to optimize
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// JSON settings document
    #[arg(long, value_name = "FILE")]
    config: PathBuf,

    /// Directory the site URL is served from
    #[arg(long, value_name = "DIR")]
    site_root: PathBuf,

    /// Public URL of the site
    #[arg(long, value_name = "URL")]
    site_url: String,

    /// Artifact cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: PathBuf,

    /// Public URL of the cache directory (default: <site-url>/cache)
    #[arg(long, value_name = "URL")]
    cache_url: Option<String>,

    /// Directory holding critical CSS files (default: <site-root>/critical-css)
    #[arg(long, value_name = "DIR")]
    critical_dir: Option<PathBuf>,

    /// JSON object of page facts answering critical CSS conditions
    #[arg(long, value_name = "FILE")]
    facts: Option<PathBuf>,

    /// Query string of the request, used to select editor views
    #[arg(long, value_name = "QUERY", default_value = "")]
    query: String,

    /// Treat the request as coming from a site administrator
    #[arg(long)]
    privileged: bool,

    /// Treat the connection as TLS
    #[arg(long)]
    ssl: bool,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

/// Collects pushed URLs so they can be reported as `Link` headers.
#[derive(Default)]
struct LinkHeaders {
    links: RefCell<Vec<String>>,
}

impl ServerPush for LinkHeaders {
    fn push(&self, url: &str, kind: &str) -> bool {
        self.links
            .borrow_mut()
            .push(format!("<{url}>; rel=preload; as={kind}"));
        true
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Optimize(args) => optimize(&args),
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn load_registry(facts: Option<&Path>) -> anyhow::Result<PredicateRegistry> {
    let Some(path) = facts else {
        return Ok(PredicateRegistry::new());
    };
    match read_json(path)? {
        Value::Object(map) => Ok(PredicateRegistry::from_facts(&map)),
        _ => bail!("{} must contain a JSON object", path.display()),
    }
}

fn optimize(args: &OptimizeArgs) -> anyhow::Result<()> {
    // STEP 1: Load inputs.
    let html = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let document = read_json(&args.config)?;
    let raw = RawConfig::from_value(document.clone())?;
    let critical = CriticalConfig::from_document(&document).context("invalid critical settings")?;
    let registry = load_registry(args.facts.as_deref())?;

    let site = Site::new(&args.site_url, &args.site_root);
    let cache_url = args
        .cache_url
        .clone()
        .unwrap_or_else(|| format!("{}/cache", site.url()));
    let critical_dir = args
        .critical_dir
        .clone()
        .unwrap_or_else(|| args.site_root.join("critical-css"));

    // STEP 2: Check the editor view before doing any work.
    let view = ViewMode::from_query(&args.query)
        .map(|mode| {
            authorize(critical.editor_public, args.privileged)?;
            let page_url = if args.query.is_empty() {
                site.url().to_string()
            } else {
                format!("{}/?{}", site.url(), args.query.trim_start_matches('?'))
            };
            let assets = critical
                .editor_assets
                .clone()
                .unwrap_or_else(|| format!("{}/o10n", site.url()));
            Ok::<_, anyhow::Error>(EditorView::new(mode, &page_url, &assets))
        })
        .transpose()?;

    // STEP 3: Services.
    let cache = FileCache::new(&args.cache_dir, &cache_url);
    let proxy = CacheProxy::new(&cache, HttpFetcher::new()?);
    let minifier = LightningMinifier::new(raw.minify.level);
    let push = LinkHeaders::default();
    let services = Services {
        cache: &cache,
        proxy: &proxy,
        minifier: &minifier,
        push: Some(&push),
    };

    // STEP 4: Render.
    let mut ctx = RenderContext::new();
    let settings = Settings::load(&raw, &mut ctx.notices);
    if let Some(view) = &view {
        view.install(&mut ctx);
    }

    let secure = args.ssl || site.is_secure();
    let selector = CriticalCssSelector::new(&critical, critical_dir, &registry, services)
        .secure(secure)
        .debug_view(view.as_ref().is_some_and(|view| view.mode().is_iframe()));
    if let Some(output) = selector.render(&mut ctx) {
        tracing::info!(files = output.files.len(), "critical CSS injected");
    }

    let optimizer = CssOptimizer::new(settings, &site, services);
    optimizer.setup_client(&mut ctx);
    let report = optimizer.process_html(&html, &mut ctx);
    tracing::info!(
        stylesheets = report.stylesheets,
        minified = report.minified,
        groups = report.groups,
        async_entries = report.async_entries,
        "stylesheets optimized"
    );

    let mut result = ctx.finish(&html);
    if let Some(view) = &view {
        result = view.apply(&result);
    }

    // STEP 5: Output.
    match &args.output {
        Some(path) => {
            fs::write(path, &result).with_context(|| format!("writing {}", path.display()))?;
        }
        None => print!("{result}"),
    }
    for link in push.links.borrow().iter() {
        eprintln!("{} {link}", "Link:".cyan());
    }
    print_notices(&ctx.notices);
    Ok(())
}

fn print_notices(notices: &Notices) {
    for notice in notices.iter() {
        eprintln!(
            "{} [{}] {}",
            "warning:".yellow().bold(),
            notice.component,
            notice.message
        );
    }
}
