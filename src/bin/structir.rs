//! `structir` CLI: build an index, run one query, or run a batch from a parameter file.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use structir::analyzer::EnglishAnalyzer;
use structir::batch;
use structir::params::Params;
use structir::ranking::rank;
use structir::{EvalContext, Index, MemoryIndex, QueryParser, RetrievalModel};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Structured query evaluation CLI", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build an index from a corpus file and save it.
    ///
    /// Corpus lines: `external_id<TAB>column<TAB>...`; a `name=text` column goes to field
    /// `name`, any other column to `body`.
    Index {
        /// Corpus file.
        #[arg(short, long)]
        input: PathBuf,

        /// Output index file.
        #[arg(short, long)]
        output: PathBuf,

        /// Disable plural stemming.
        #[arg(long, default_value_t = false)]
        no_stem: bool,
    },

    /// Evaluate one query against a saved index.
    Search {
        /// Index file (produced by `index`).
        #[arg(short, long)]
        index: PathBuf,

        /// Retrieval model: UnrankedBoolean, RankedBoolean, BM25, Indri.
        #[arg(short, long, default_value = "Indri")]
        algorithm: String,

        /// Model parameter, `name=value` (k_1, b, k_3, mu, lambda). Repeatable.
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,

        /// Top-k results to print.
        #[arg(short, long, default_value_t = 10)]
        k: usize,

        /// Query text.
        query: Vec<String>,
    },

    /// Run a batch described by a parameter file.
    Run {
        /// Parameter file (`key=value` lines).
        params: PathBuf,

        /// Abort on the first query that fails to parse or evaluate.
        #[arg(long, default_value_t = false)]
        fail_fast: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("structir=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Index {
            input,
            output,
            no_stem,
        } => {
            let corpus = std::fs::read_to_string(&input)?;
            let analyzer = if no_stem {
                EnglishAnalyzer::unstemmed()
            } else {
                EnglishAnalyzer::default()
            };
            let index = MemoryIndex::from_corpus(&corpus, analyzer)?;
            tracing::info!(
                docs = index.num_docs(),
                fields = ?index.fields().collect::<Vec<_>>(),
                "index built"
            );
            index.save(&output)?;
            println!("Indexed {} documents to {:?}", index.num_docs(), output);
        }
        Commands::Search {
            index,
            algorithm,
            set,
            k,
            query,
        } => {
            let index = MemoryIndex::load(&index)?;
            let mut model = RetrievalModel::from_str(&algorithm)?;
            for kv in &set {
                let (name, value) = kv
                    .split_once('=')
                    .ok_or_else(|| format!("expected NAME=VALUE, got `{kv}`"))?;
                let value: f64 = value
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid value for {name}: `{value}`"))?;
                if !model.set_parameter(name.trim(), value) {
                    return Err(format!(
                        "unknown or invalid parameter `{name}` for {model} (expected one of {:?})",
                        model.parameter_names()
                    )
                    .into());
                }
            }

            let text = query.join(" ");
            let parser = QueryParser::new(index.analyzer(), &model);
            let tree = parser.parse(&text)?;
            let ctx = EvalContext::new(&index, model);
            let ranking = rank(&index, &ctx.evaluate(&tree)?)?;

            if ranking.is_empty() {
                println!("No results.");
            }
            for (i, doc) in ranking.iter().take(k).enumerate() {
                println!("{}\t{}\t{}", i + 1, doc.external_id, doc.score);
            }
        }
        Commands::Run { params, fail_fast } => {
            let params = Params::load(&params)?;
            let summary = batch::run(&params, fail_fast)?;
            println!(
                "Ran {} queries ({} failed) into {:?}",
                summary.queries, summary.failed, params.output_path
            );
        }
    }

    Ok(())
}
