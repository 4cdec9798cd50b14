use anyhow::Context;
use cf_core::{ParseOutcome, RulesetParser, Settings, Target};
use cf_flow::FlowResolver;
use cf_render::{GraphvizRenderer, OutputWriter};
use clap::{Parser, Subcommand};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chainflow")]
#[command(version, about = "Visualize iptables rule evaluation flow", long_about = None)]
struct Cli {
    /// Settings file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write DOT graphs and HTML pages for an iptables-save dump
    Generate {
        #[arg(short = 'd', long = "outputdir", default_value = ".")]
        output_dir: PathBuf,
        /// Run Graphviz on every generated graph
        #[arg(long)]
        render: bool,
        /// Ruleset file; standard input when omitted
        input: Option<PathBuf>,
    },
    /// Print the resolved flow of one chain
    Flows {
        #[arg(short, long, default_value = "filter")]
        table: String,
        #[arg(short, long)]
        chain: String,
        #[arg(long)]
        json: bool,
        /// Do not treat the chain policy as a final rule
        #[arg(long)]
        no_policy: bool,
        input: Option<PathBuf>,
    },
    /// Parse a ruleset and report lines that were skipped
    Check { input: Option<PathBuf> },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::Generate {
            output_dir,
            render,
            input,
        } => generate(&settings, &output_dir, render, input.as_deref())?,
        Commands::Flows {
            table,
            chain,
            json,
            no_policy,
            input,
        } => {
            let settings = Settings {
                policy_as_trailing_rule: settings.policy_as_trailing_rule && !no_policy,
                ..settings
            };
            show_flows(&settings, &table, &chain, json, input.as_deref())?
        }
        Commands::Check { input } => check(input.as_deref())?,
    }

    Ok(())
}

fn read_ruleset(input: Option<&Path>) -> anyhow::Result<ParseOutcome> {
    let parser = RulesetParser::new();
    match input {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open ruleset {:?}", path))?;
            parser.parse(BufReader::new(file))
        }
        None => parser.parse(std::io::stdin().lock()),
    }
}

fn generate(
    settings: &Settings,
    output_dir: &Path,
    render: bool,
    input: Option<&Path>,
) -> anyhow::Result<()> {
    // checked before any input is consumed
    let writer = OutputWriter::new(output_dir, settings)?;

    info!("Reading iptables data");
    let outcome = read_ruleset(input)?;

    info!("Generating DOT output in {}", writer.root().display());
    let output = writer.write_all(&outcome.ruleset, settings)?;

    println!(
        "✅ {} chain pages, {} table graphs, {} entry graphs",
        output.chain_pages,
        output.table_graphs.len(),
        output.entry_graphs.len()
    );
    if !outcome.diagnostics.is_empty() {
        println!("⚠️  {} input line(s) skipped", outcome.diagnostics.len());
    }

    if render {
        info!("Generating {} output", settings.render_format);
        let renderer = GraphvizRenderer::new(&settings.dot_binary, &settings.render_format);
        let summary = tokio::runtime::Runtime::new()?
            .block_on(async { renderer.render_all(&output.dot_files).await });

        println!("🖼️  Rendered {} graph(s)", summary.rendered.len());
        if !summary.is_clean() {
            println!("⚠️  {} graph(s) failed to render", summary.failures.len());
        }
    }

    Ok(())
}

fn show_flows(
    settings: &Settings,
    table_name: &str,
    chain: &str,
    json: bool,
    input: Option<&Path>,
) -> anyhow::Result<()> {
    let outcome = read_ruleset(input)?;
    let table = outcome
        .ruleset
        .table(table_name)
        .with_context(|| format!("Table '{}' not found", table_name))?;
    if table.chain(chain).is_none() {
        anyhow::bail!("Chain '{}' not found in table '{}'", chain, table_name);
    }

    let resolution = FlowResolver::new(table)
        .with_policy_as_trailing_rule(settings.policy_as_trailing_rule)
        .resolve(chain);

    if json {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
        return Ok(());
    }

    println!(
        "{}/{}: {} edges across {} chains",
        table_name,
        chain,
        resolution.edges.len(),
        resolution.visited.len()
    );
    for edge in &resolution.edges {
        let condition = resolution
            .condition(&edge.from.chain, edge.from.index)
            .filter(|c| !c.is_empty())
            .unwrap_or("(always)");
        let marker = match edge.to {
            Target::Verdict(_) => "■",
            Target::Chain(_) => "→",
        };
        println!("  {} {}  [{}]", marker, edge, condition);
    }

    Ok(())
}

fn check(input: Option<&Path>) -> anyhow::Result<()> {
    let outcome = read_ruleset(input)?;

    for table in &outcome.ruleset.tables {
        let rules: usize = table.chains.iter().map(|c| c.rules.len()).sum();
        println!(
            "  • {} - {} chains, {} rules",
            table.name,
            table.chains.len(),
            rules
        );
    }

    if outcome.diagnostics.is_empty() {
        println!("✅ No problems found");
        return Ok(());
    }

    println!("\n⚠️  {} line(s) skipped:", outcome.diagnostics.len());
    for diagnostic in &outcome.diagnostics {
        println!("   {}", diagnostic);
    }
    anyhow::bail!("{} line(s) could not be parsed", outcome.diagnostics.len());
}
