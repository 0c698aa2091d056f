use std::collections::BTreeSet;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use patchforge::config::{ForgeConfig, CONFIG_FILE};
use patchforge::extract::extract_many;
use patchforge::feature::FeatureIndex;
use patchforge::git::GitTree;
use patchforge::model::types::{FeatureName, Platform};
use patchforge::series::apply_series;
use patchforge::store::{AlwaysConfirm, Confirm, PatchStore};
use patchforge::telemetry;

/// Patch-series manager for a forked browser source tree
///
/// patchforge captures working-tree edits as per-file patch artifacts,
/// replays ordered series of artifacts onto a clean checkout, and tracks
/// which fork feature each patched file belongs to.
///
/// Paths given to 'extract' and recorded in the feature index are always
/// relative to the working-tree root configured in patchforge.toml.
#[derive(Parser)]
#[command(name = "patchforge")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture working-tree changes as patch artifacts
    ///
    /// Diffs each path against the base commit and writes the result under
    /// the patches directory, mirroring the tree layout with a .patch
    /// suffix. A file deleted from the tree produces a deletion marker.
    Extract {
        /// Tree-relative paths to capture
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Base commit the patches are relative to
        #[arg(long)]
        base: String,

        /// Overwrite existing artifacts without prompting
        #[arg(long)]
        force: bool,
    },

    /// Apply the patch series onto the working tree
    ///
    /// Walks the 'series' manifest (plus the platform overlay) in order,
    /// applying each artifact with a three-way fallback. Failures are
    /// collected and reported together; already-applied entries are not
    /// rolled back.
    Apply {
        /// Verify the series without touching the tree
        #[arg(long)]
        dry_run: bool,

        /// Platform series to apply (defaults to config, then the host)
        #[arg(long)]
        platform: Option<Platform>,
    },

    /// Manage the feature classification index
    #[command(subcommand)]
    Feature(FeatureCommands),
}

#[derive(Subcommand)]
enum FeatureCommands {
    /// Create a feature or merge a commit's files into it
    Add {
        /// Feature name (lowercase letters, digits, hyphens)
        name: FeatureName,

        /// Commit whose changed files to attribute
        #[arg(long)]
        commit: String,

        /// Prefixed description, e.g. "feat: llm chat"
        #[arg(long)]
        description: String,
    },

    /// List all features
    List {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show one feature's description and files
    Show {
        /// Feature name
        name: FeatureName,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List patched files not attributed to any feature
    Unclassified {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Attribute specific files to a feature
    Classify {
        /// Feature name
        name: FeatureName,

        /// Tree-relative files to attribute
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Description (required when the feature does not exist yet)
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();
    let config = ForgeConfig::load(&cli.config)?;

    match cli.command {
        Commands::Extract { paths, base, force } => run_extract(&config, &paths, &base, force),
        Commands::Apply { dry_run, platform } => run_apply(&config, dry_run, platform),
        Commands::Feature(cmd) => run_feature(&config, cmd),
    }
}

// ---------------------------------------------------------------------------
// extract
// ---------------------------------------------------------------------------

/// Prompts on stderr so stdout stays pipeable.
struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm_overwrite(&self, artifact: &Path) -> bool {
        eprint!("{} exists, overwrite? [y/N] ", artifact.display());
        let _ = std::io::stderr().flush();
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes")
    }
}

fn run_extract(config: &ForgeConfig, paths: &[PathBuf], base: &str, force: bool) -> Result<()> {
    let tree = GitTree::new(config.tree_root());
    let store = PatchStore::new(config.patches_dir());

    let (patches, extract_failures) = extract_many(&tree, paths, base)?;
    let mut failures: Vec<(PathBuf, String)> = extract_failures
        .into_iter()
        .map(|(path, e)| (path, e.to_string()))
        .collect();

    let confirm: &dyn Confirm = if force {
        &AlwaysConfirm
    } else {
        &TerminalConfirm
    };
    let mut written = 0usize;
    for patch in &patches {
        match store.write_patch(patch, force, confirm) {
            Ok(artifact) => {
                println!("wrote {}", artifact.display());
                written += 1;
            }
            // A declined overwrite keeps a stale artifact on disk; count
            // it in the aggregate failures so the exit status shows it.
            Err(e) => failures.push((patch.path.clone(), e.to_string())),
        }
    }

    println!("{written} written, {} failed", failures.len());
    if !failures.is_empty() {
        for (path, diagnostic) in &failures {
            eprintln!("  {}: {diagnostic}", path.display());
        }
        bail!("{} of {} paths failed", failures.len(), paths.len());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

fn run_apply(config: &ForgeConfig, dry_run: bool, platform: Option<Platform>) -> Result<()> {
    let tree = GitTree::new(config.tree_root());
    let platform = platform.unwrap_or_else(|| config.platform());

    let outcome = apply_series(&tree, config.patches_dir(), platform, dry_run)?;
    let verb = if dry_run { "verified" } else { "applied" };
    println!("{} {}, {} failed", outcome.applied.len(), verb, outcome.failed.len());

    if !outcome.is_clean() {
        for failure in &outcome.failed {
            eprintln!("  {}: {}", failure.entry, failure.diagnostic);
        }
        bail!(
            "{} series entries failed for platform {platform}",
            outcome.failed.len()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// feature
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct FeatureView<'a> {
    name: &'a str,
    description: &'a str,
    files: Vec<&'a Path>,
}

#[allow(clippy::too_many_lines)]
fn run_feature(config: &ForgeConfig, cmd: FeatureCommands) -> Result<()> {
    let index_path = config.features_file();

    match cmd {
        FeatureCommands::Add {
            name,
            commit,
            description,
        } => {
            let tree = GitTree::new(config.tree_root());
            let changed = tree
                .changed_files(&commit)
                .with_context(|| format!("resolving changed files of {commit}"))?;

            let mut index = FeatureIndex::load(&index_path)?;
            let report = index.add_or_update(&name, &description, &changed, config.prefixes())?;
            index.save()?;

            let action = if report.created { "created" } else { "updated" };
            println!(
                "{action} {name}: {} added, {} already present",
                report.added, report.already_present
            );
            Ok(())
        }

        FeatureCommands::List { format } => {
            let index = FeatureIndex::load(&index_path)?;
            let features = index.list();
            match format {
                OutputFormat::Json => {
                    let views: Vec<FeatureView<'_>> = features
                        .iter()
                        .map(|(name, f)| FeatureView {
                            name: name.as_str(),
                            description: &f.description,
                            files: f.files.iter().map(PathBuf::as_path).collect(),
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&views)?);
                }
                OutputFormat::Text => {
                    for (name, feature) in features {
                        println!(
                            "{name}  {}  ({} files)",
                            feature.description,
                            feature.files.len()
                        );
                    }
                }
            }
            Ok(())
        }

        FeatureCommands::Show { name, format } => {
            let index = FeatureIndex::load(&index_path)?;
            let feature = index.get(&name)?;
            match format {
                OutputFormat::Json => {
                    let view = FeatureView {
                        name: name.as_str(),
                        description: &feature.description,
                        files: feature.files.iter().map(PathBuf::as_path).collect(),
                    };
                    println!("{}", serde_json::to_string_pretty(&view)?);
                }
                OutputFormat::Text => {
                    println!("{name}: {}", feature.description);
                    for file in &feature.files {
                        println!("  {}", file.display());
                    }
                }
            }
            Ok(())
        }

        FeatureCommands::Unclassified { format } => {
            let index = FeatureIndex::load(&index_path)?;
            let store = PatchStore::new(config.patches_dir());
            let universe = store.source_paths()?;
            let rest = index.unclassified(&universe);
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&rest)?);
                }
                OutputFormat::Text => {
                    for path in &rest {
                        println!("{}", path.display());
                    }
                }
            }
            Ok(())
        }

        FeatureCommands::Classify {
            name,
            files,
            description,
        } => {
            let mut index = FeatureIndex::load(&index_path)?;
            let selection: BTreeSet<PathBuf> = files.into_iter().collect();
            let report = index.classify(
                &name,
                &selection,
                description.as_deref(),
                config.prefixes(),
            )?;
            index.save()?;
            println!(
                "{name}: {} added, {} already present",
                report.added, report.already_present
            );
            Ok(())
        }
    }
}
