use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use sinkhound_core::{commit_limit, CommitFindings, OutputFormat, RuleSet, SinkhoundConfig};
use sinkhound_difflens::filter::{normalize_extensions, parse_extension_list};
use sinkhound_history::mining::GitHistory;
use sinkhound_history::repo::Checkout;
use sinkhound_history::report;
use sinkhound_history::scanner::{self, ScanOptions};

#[derive(Parser)]
#[command(
    name = "sinkhound",
    version,
    about = "Find the commits that introduced dangerous sinks",
    long_about = "SinkHound walks the history of a git branch, diffs every commit against its\n\
                   first parent, and reports added lines that match a set of regex sink rules.\n\n\
                   Examples:\n  \
                     sinkhound scan --repo .                        Scan HEAD with the built-in PHP sinks\n  \
                     sinkhound scan --repo . --include-ext php,inc  Only scan PHP sources\n  \
                     sinkhound scan --repo https://host/app.git --branch main\n  \
                     sinkhound rules --sinks sinks.yml              Validate a sink file\n  \
                     sinkhound init                                 Create a .sinkhound.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .sinkhound.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable commit listing (default)\n  \
                         json      One JSON object per commit per line, camelCase keys\n  \
                         markdown  GitHub-flavored Markdown\n  \
                         sarif     SARIF v2.1.0 (scan subcommand only)"
    )]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress logging and the scan summary
    #[arg(long, short, global = true)]
    quiet: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a repository's history for added sink lines
    #[command(long_about = "Scan a repository's history for added sink lines.\n\n\
        Commits are visited oldest first. Root commits are skipped and merge commits\n\
        are compared with their first parent. Findings are printed as soon as each\n\
        commit has been scanned.\n\n\
        Examples:\n  sinkhound scan --repo .\n  sinkhound scan --repo . --max-commits 500 --fail-on-risk 8\n  sinkhound scan --repo . --format sarif > sinkhound.sarif")]
    Scan {
        /// Local path or clone URL of the repository
        #[arg(long, default_value = ".")]
        repo: String,

        /// Branch to scan (default: HEAD)
        #[arg(long, env = "SINKHOUND_BRANCH")]
        branch: Option<String>,

        /// YAML sink definition file (default: built-in PHP sinks)
        #[arg(long, env = "SINKHOUND_SINKS")]
        sinks: Option<PathBuf>,

        /// Comma-separated file extensions to scan (e.g. "php,inc")
        #[arg(long, env = "SINKHOUND_INCLUDE_EXT")]
        include_ext: Option<String>,

        /// Visit at most this many commits, 0 or below for no limit
        #[arg(long, env = "SINKHOUND_MAX_COMMITS", allow_negative_numbers = true)]
        max_commits: Option<i64>,

        /// Exit with non-zero code if a finding has at least this risk
        #[arg(
            long,
            long_help = "Exit with status 1 if any finding has a risk of at least this value.\n\n\
                Useful in CI pipelines to fail builds when a high-risk sink lands."
        )]
        fail_on_risk: Option<u32>,
    },
    /// Validate and list sink rules
    #[command(long_about = "Validate and list sink rules.\n\n\
        Loads the sink file (or the built-in PHP sinks), compiles every pattern,\n\
        and prints the rules in order.\n\n\
        Examples:\n  sinkhound rules\n  sinkhound rules --sinks sinks.yml --format json")]
    Rules {
        /// YAML sink definition file (default: built-in PHP sinks)
        #[arg(long, env = "SINKHOUND_SINKS")]
        sinks: Option<PathBuf>,
    },
    /// Create a default .sinkhound.toml configuration file
    #[command(long_about = "Create a default .sinkhound.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .sinkhound.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

/// Scan settings after merging flags, environment, and config file.
struct ScanSettings {
    sinks: Option<PathBuf>,
    branch: Option<String>,
    options: ScanOptions,
    fail_on_risk: Option<u32>,
}

impl ScanSettings {
    fn resolve(
        config: &SinkhoundConfig,
        branch: Option<String>,
        sinks: Option<PathBuf>,
        include_ext: Option<String>,
        max_commits: Option<i64>,
        fail_on_risk: Option<u32>,
    ) -> Self {
        let include_ext = match include_ext {
            Some(csv) => parse_extension_list(&csv),
            None => normalize_extensions(&config.scan.include_ext),
        };
        let max_commits = match max_commits {
            Some(limit) => commit_limit(limit),
            None => config.scan.commit_limit(),
        };

        Self {
            sinks: sinks.or_else(|| config.scan.sinks.clone()),
            branch: branch.or_else(|| config.scan.branch.clone()),
            options: ScanOptions {
                include_ext,
                max_commits,
            },
            fail_on_risk: fail_on_risk.or(config.output.fail_on_risk),
        }
    }
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1m\x1b[33m🐾\x1b[0m \x1b[1msinkhound\x1b[0m v{version}: find the commit that let the sink in\n");

        println!("Quick start:");
        println!("  \x1b[36msinkhound init\x1b[0m              Create a .sinkhound.toml config file");
        println!("  \x1b[36msinkhound scan --repo .\x1b[0m     Scan the current repository's history");
        println!("  \x1b[36msinkhound rules\x1b[0m             Show the sink rules in use\n");

        println!("All commands:");
        println!("  \x1b[32mscan\x1b[0m   Report commits whose added lines match a sink");
        println!("  \x1b[32mrules\x1b[0m  Validate and list sink rules");
        println!("  \x1b[32minit\x1b[0m   Create default configuration\n");
    } else {
        println!("sinkhound v{version}: find the commit that let the sink in\n");

        println!("Quick start:");
        println!("  sinkhound init              Create a .sinkhound.toml config file");
        println!("  sinkhound scan --repo .     Scan the current repository's history");
        println!("  sinkhound rules             Show the sink rules in use\n");

        println!("All commands:");
        println!("  scan   Report commits whose added lines match a sink");
        println!("  rules  Validate and list sink rules");
        println!("  init   Create default configuration\n");
    }

    println!("Run 'sinkhound <command> --help' for details.");
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        LevelFilter::OFF
    } else if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_rules(sinks: Option<&Path>) -> Result<RuleSet> {
    let rules = match sinks {
        Some(path) => RuleSet::from_file(path)?,
        None => RuleSet::builtin()?,
    };
    if rules.is_empty() {
        tracing::warn!("no sink rules loaded, nothing will match");
    }
    Ok(rules)
}

fn print_findings(findings: &CommitFindings, format: OutputFormat, use_color: bool) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", report::render_json_line(findings)?),
        OutputFormat::Markdown => print!("{}", report::render_markdown(findings)),
        OutputFormat::Text => println!("{}", report::render_text(findings, use_color)),
        OutputFormat::Sarif => unreachable!(),
    }
    Ok(())
}

/// Run a scan and report whether the fail-on-risk threshold was met.
fn run_scan(
    settings: &ScanSettings,
    repo: &str,
    format: OutputFormat,
    use_color: bool,
    quiet: bool,
) -> Result<bool> {
    let rules = load_rules(settings.sinks.as_deref())?;
    let checkout = Checkout::acquire(repo, settings.branch.as_deref())?;
    let history = GitHistory::new(checkout.repository(), settings.branch.as_deref())?;

    tracing::info!(
        repo,
        rules = rules.len(),
        include_ext = ?settings.options.include_ext,
        max_commits = ?settings.options.max_commits,
        "scan started"
    );

    let spinner = if std::io::stderr().is_terminal() && !quiet {
        let pb = indicatif::ProgressBar::new_spinner();
        pb.set_style(
            indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
                .into_diagnostic()?,
        );
        pb.set_message("Scanning history...");
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    if format == OutputFormat::Markdown {
        println!("# SinkHound findings\n");
    }

    let mut scan = scanner::scan(&rules, history, &settings.options);
    let mut collected = Vec::new();
    while let Some(findings) = scan.next() {
        let findings = findings.inspect_err(|_e| {
            if let Some(pb) = &spinner {
                pb.finish_with_message("Failed");
            }
        })?;

        if format == OutputFormat::Sarif {
            collected.push(findings);
        } else if let Some(pb) = &spinner {
            pb.suspend(|| print_findings(&findings, format, use_color))?;
        } else {
            print_findings(&findings, format, use_color)?;
        }

        if let Some(pb) = &spinner {
            let stats = scan.stats();
            pb.set_message(format!(
                "Scanning history... {} commits, {} matches",
                stats.commits_visited, stats.matches
            ));
        }
    }
    let stats = scan.stats();

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    if format == OutputFormat::Sarif {
        let sarif = report::to_sarif(&collected);
        println!("{}", serde_json::to_string_pretty(&sarif).into_diagnostic()?);
    }

    tracing::info!(
        commits = stats.commits_visited,
        matches = stats.matches,
        max_risk = stats.max_risk,
        "scan finished"
    );
    if !quiet {
        eprintln!("{}", report::render_summary(&stats));
    }

    let failed = match settings.fail_on_risk {
        Some(threshold) => stats.matches > 0 && stats.max_risk >= threshold,
        None => false,
    };
    Ok(failed)
}

fn print_rules(rules: &RuleSet, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let list: Vec<_> = rules.iter().collect();
            println!("{}", serde_json::to_string_pretty(&list).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("| # | Risk | Description | Pattern |");
            println!("|---|------|-------------|---------|");
            for (i, rule) in rules.iter().enumerate() {
                println!(
                    "| {} | {} | {} | `{}` |",
                    i + 1,
                    rule.risk,
                    rule.description.replace('|', "\\|"),
                    rule.pattern().replace('|', "\\|")
                );
            }
        }
        OutputFormat::Text => {
            for (i, rule) in rules.iter().enumerate() {
                println!(
                    "{:>3}. [risk {:>2}] {}\n     {}",
                    i + 1,
                    rule.risk,
                    rule.description,
                    rule.pattern()
                );
            }
            println!("\n{} rule(s) loaded", rules.len());
        }
        OutputFormat::Sarif => {
            miette::bail!("SARIF output is only supported for the scan subcommand.");
        }
    }
    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# SinkHound Configuration
# Command-line flags and SINKHOUND_* environment variables override these values.

[scan]
# YAML sink definitions; the built-in PHP sinks are used when unset
# sinks = "sinks.yml"
# branch = "main"
# include_ext = ["php", "inc"]
# 0 or below scans the whole history
# max_commits = 0

[output]
# Exit with status 1 when a finding reaches this risk
# fail_on_risk = 8
"#;

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => SinkhoundConfig::from_file(path)?,
        None => {
            let default_path = Path::new(".sinkhound.toml");
            if default_path.exists() {
                SinkhoundConfig::from_file(default_path)?
            } else {
                SinkhoundConfig::default()
            }
        }
    };

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    tracing::debug!(format = %cli.format, "configuration loaded");

    match cli.command {
        None => {
            print_welcome(use_color);
        }
        Some(Command::Scan {
            ref repo,
            branch,
            sinks,
            include_ext,
            max_commits,
            fail_on_risk,
        }) => {
            let settings = ScanSettings::resolve(
                &config,
                branch,
                sinks,
                include_ext,
                max_commits,
                fail_on_risk,
            );
            if run_scan(&settings, repo, cli.format, use_color, cli.quiet)? {
                std::process::exit(1);
            }
        }
        Some(Command::Rules { sinks }) => {
            let sinks = sinks.or_else(|| config.scan.sinks.clone());
            let rules = load_rules(sinks.as_deref())?;
            print_rules(&rules, cli.format)?;
        }
        Some(Command::Init) => {
            let path = Path::new(".sinkhound.toml");
            if path.exists() {
                miette::bail!(".sinkhound.toml already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .sinkhound.toml with default configuration");
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "sinkhound", &mut std::io::stdout());
        }
    }

    Ok(())
}
