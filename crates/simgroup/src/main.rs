//! simgroup CLI - Near-duplicate grouping and similarity search for JSON documents.

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use simgroup::{
    read_json_files, ClusterRequest, GroupId, GroupRecord, GroupingConfig, GroupingMode,
    JobConfig, JobRunner, JobState, SearchConfig, SignatureParams, SignatureStore,
    SimilaritySearch, SqliteStore,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Near-duplicate grouping and similarity search for JSON documents.
///
/// Clusters documents by estimated Jaccard similarity using MinHash and LSH,
/// stores the result as a named group, and ranks new documents against it.
#[derive(Parser, Debug)]
#[command(name = "simgroup")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database holding groups and signatures.
    #[arg(long, global = true, env = "SIMGROUP_DB", default_value = "simgroup.db")]
    db: PathBuf,

    /// Output results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (debug logging).
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Signature parameters. Unset values fall back to the environment, then
/// to the built-in defaults.
#[derive(Args, Debug, Clone)]
struct GroupingArgs {
    /// Similarity threshold (0.0-1.0) the LSH banding is tuned for.
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Number of MinHash permutations.
    #[arg(short = 'p', long)]
    permutations: Option<usize>,

    /// N-gram size for shingling.
    #[arg(short = 'n', long)]
    ngram: Option<usize>,

    /// Seed for the permutation hash functions.
    #[arg(long)]
    seed: Option<u64>,

    /// Merge candidates transitively instead of the single-pass grouping.
    #[arg(long)]
    transitive: bool,
}

impl GroupingArgs {
    fn to_config(&self) -> GroupingConfig {
        let mut config = GroupingConfig::from_env();
        if let Some(threshold) = self.threshold {
            config = config.with_threshold(threshold);
        }
        if let Some(permutations) = self.permutations {
            config = config.with_num_permutations(permutations);
        }
        if let Some(ngram) = self.ngram {
            config = config.with_ngram_size(ngram);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if self.transitive {
            config = config.with_mode(GroupingMode::Transitive);
        }
        config
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Cluster JSON files into a new group
    Cluster {
        /// Input JSON files. A top-level array holds one document per element.
        #[arg(required = true, value_name = "FILES")]
        files: Vec<PathBuf>,

        /// Name of the group to create.
        #[arg(long)]
        name: String,

        /// Division the group belongs to.
        #[arg(long, default_value = "default")]
        division: String,

        /// Number of worker tasks.
        #[arg(long)]
        workers: Option<usize>,

        /// Show a spinner while the job runs.
        #[arg(long)]
        progress: bool,

        #[command(flatten)]
        grouping: GroupingArgs,
    },

    /// Rank documents of a stored group against query files
    ///
    /// Queries are signed with the parameters the group was clustered with.
    Search {
        /// Group to search.
        #[arg(long)]
        group: GroupId,

        /// Query JSON files.
        #[arg(required = true, value_name = "FILES")]
        files: Vec<PathBuf>,

        /// Matches returned per query [default: SIMGROUP_TOP_K or 3].
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Append documents to an existing group
    Add {
        /// Group to extend.
        #[arg(long)]
        group: GroupId,

        /// Input JSON files.
        #[arg(required = true, value_name = "FILES")]
        files: Vec<PathBuf>,
    },

    /// List stored groups
    Groups {
        /// Only list groups of this division.
        #[arg(long)]
        division: Option<String>,
    },

    /// Write a group's clustering result as JSON
    Export {
        /// Group to export.
        group: GroupId,

        /// Output file (stdout if omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rename a group
    Rename {
        /// Group to rename.
        group: GroupId,

        /// New name.
        name: String,
    },

    /// Delete a group and its signatures
    Delete {
        /// Group to delete.
        group: GroupId,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Summary line for a stored group.
#[derive(Serialize)]
struct GroupSummary<'a> {
    id: GroupId,
    name: &'a str,
    division: &'a str,
    created_at: String,
    files: usize,
    params: SignatureParams,
}

impl<'a> From<&'a GroupRecord> for GroupSummary<'a> {
    fn from(group: &'a GroupRecord) -> Self {
        Self {
            id: group.id,
            name: &group.name,
            division: &group.division,
            created_at: group.created_at.to_rfc3339(),
            files: group.files.len(),
            params: group.params,
        }
    }
}

/// Create a spinner for indeterminate progress.
fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "simgroup=debug,simgroup_core=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_store(cli: &Cli) -> Result<Arc<dyn SignatureStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(SqliteStore::open(&cli.db)?))
}

async fn run_cluster(
    cli: &Cli,
    files: &[PathBuf],
    name: &str,
    division: &str,
    workers: Option<usize>,
    progress: bool,
    grouping: &GroupingArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let grouping = grouping.to_config();
    grouping.validate()?;
    let mut config = JobConfig::from_env().with_grouping(grouping);
    if let Some(workers) = workers {
        config = config.with_workers(workers);
    }

    let (documents, file_infos) = read_json_files(files)?;
    let start = Instant::now();
    let store = open_store(cli)?;
    let runner = JobRunner::start(store, config)?;

    let id = runner
        .submit(ClusterRequest {
            documents,
            group_name: name.to_string(),
            division: division.to_string(),
            files: file_infos,
        })
        .await?;

    let pb = (progress && !cli.json).then(|| create_spinner("Clustering..."));
    let snapshot = if let Some(pb) = &pb {
        loop {
            let snapshot = runner.poll(id).await?;
            pb.set_message(format!("Job {id}: {}", snapshot.state));
            if snapshot.state.is_terminal() {
                break snapshot;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    } else {
        runner.wait(id).await?
    };
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    runner.shutdown().await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    match (snapshot.state, &snapshot.output) {
        (JobState::Success, Some(output)) => {
            if !cli.json {
                eprintln!("Clustering Results:");
                eprintln!("  Job:        {id}");
                eprintln!("  Group:      {} ({})", output.group_id, output.group_name);
                eprintln!("  Documents:  {}", output.num_documents);
                eprintln!("  Clusters:   {}", output.num_groups);
                eprintln!("  Files:      {}", output.files.len());
                eprintln!();
                eprintln!("Total time: {:.3}s", start.elapsed().as_secs_f64());
            }
            Ok(())
        }
        _ => Err(format!(
            "job {id} failed: {}",
            snapshot.error.as_deref().unwrap_or("unknown error")
        )
        .into()),
    }
}

fn run_search(
    cli: &Cli,
    group: GroupId,
    files: &[PathBuf],
    top_k: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = SearchConfig::from_env();
    if let Some(top_k) = top_k {
        config = config.with_top_k(top_k);
    }
    config.validate()?;

    let (queries, _) = read_json_files(files)?;
    let search = SimilaritySearch::new(open_store(cli)?);
    let results = search.search(group, &queries, config.top_k)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for (i, result) in results.iter().enumerate() {
            println!("Query {} ({}):", i + 1, result.origin);
            if result.matches.is_empty() {
                println!("  (no matches)");
            }
            for m in &result.matches {
                println!("  {:.4}  {}  {}", m.similarity, m.origin, m.payload);
            }
        }
    }
    Ok(())
}

fn run_add(cli: &Cli, group: GroupId, files: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    let (documents, _) = read_json_files(files)?;
    let search = SimilaritySearch::new(open_store(cli)?);
    let ids = search.add_documents(group, &documents)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&ids)?);
    } else {
        eprintln!(
            "Added {} of {} documents to group {group}",
            ids.len(),
            documents.len()
        );
    }
    Ok(())
}

fn run_groups(cli: &Cli, division: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let groups = open_store(cli)?.list_groups(division)?;
    let summaries: Vec<GroupSummary<'_>> = groups.iter().map(GroupSummary::from).collect();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for s in &summaries {
            println!(
                "{}\t{}\t{}\t{}\t{} file(s)\t{}",
                s.id, s.name, s.division, s.created_at, s.files, s.params
            );
        }
    }
    Ok(())
}

fn run_export(
    cli: &Cli,
    group: GroupId,
    output: Option<&PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let record = open_store(cli)?
        .get_group(group)?
        .ok_or_else(|| format!("group {group} not found"))?;
    let rendered = serde_json::to_string_pretty(&record.grouped_data)?;

    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            if cli.verbose {
                eprintln!("Wrote group {group} to {}", path.display());
            }
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn run_rename(cli: &Cli, group: GroupId, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(cli)?;
    let record = store
        .get_group(group)?
        .ok_or_else(|| format!("group {group} not found"))?;
    let updated = store.update_group(group, name, &record.grouped_data)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&GroupSummary::from(&updated))?);
    } else {
        eprintln!("Renamed group {group} to {}", updated.name);
    }
    Ok(())
}

fn run_delete(cli: &Cli, group: GroupId) -> Result<(), Box<dyn std::error::Error>> {
    if !open_store(cli)?.delete_group(group)? {
        return Err(format!("group {group} not found").into());
    }
    if !cli.json {
        eprintln!("Deleted group {group}");
    }
    Ok(())
}

async fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Commands::Cluster {
            files,
            name,
            division,
            workers,
            progress,
            grouping,
        } => run_cluster(cli, files, name, division, *workers, *progress, grouping).await,
        Commands::Search {
            group,
            files,
            top_k,
        } => run_search(cli, *group, files, *top_k),
        Commands::Add { group, files } => run_add(cli, *group, files),
        Commands::Groups { division } => run_groups(cli, division.as_deref()),
        Commands::Export { group, output } => run_export(cli, *group, output.as_ref()),
        Commands::Rename { group, name } => run_rename(cli, *group, name),
        Commands::Delete { group } => run_delete(cli, *group),
        Commands::Completions { shell } => {
            generate(*shell, &mut Cli::command(), "simgroup", &mut io::stdout());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
