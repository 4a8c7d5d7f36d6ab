//! mmpm - the MagicMirror package manager.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use miette::Result;
use mmpm_config::ConfigAccessor;
use mmpm_platform::{AssumeYes, Prompter};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod api;
mod commands;
mod host;
mod prompt;
mod remote;
mod update_checker;

use commands::{ListFilter, Session};

#[derive(Parser)]
#[command(name = "mmpm")]
#[command(version, about = "The MagicMirror package manager", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct GlobalOptions {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress log output and progress spinners
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install packages
    Install {
        /// Package titles (case-sensitive)
        #[arg(required = true)]
        names: Vec<String>,
        /// Assume yes for every confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Remove installed packages
    Remove {
        /// Package titles (case-sensitive)
        #[arg(required = true)]
        names: Vec<String>,
        /// Assume yes for every confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Search the catalog by title, author, description or category
    Search {
        query: String,
        /// Match case exactly
        #[arg(short, long)]
        case_sensitive: bool,
        /// Only print titles, and only match titles exactly
        #[arg(short, long)]
        title_only: bool,
    },

    /// Show everything known about packages
    Show {
        #[arg(required = true)]
        names: Vec<String>,
        /// Also fetch stars, forks, issues and dates from the repository host
        #[arg(short, long)]
        remote: bool,
    },

    /// List packages or categories
    List {
        #[command(flatten)]
        filter: ListArgs,
        /// Only print titles
        #[arg(short, long)]
        title_only: bool,
    },

    /// Check mmpm, MagicMirror and installed packages for upgrades
    Update,

    /// Apply available upgrades
    Upgrade {
        /// Only upgrade these (all when empty)
        names: Vec<String>,
        /// Assume yes for every confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage the package database
    Db {
        #[command(flatten)]
        action: DbArgs,
    },

    /// Manage packages not listed on the wiki
    MmPkg {
        #[command(subcommand)]
        action: MmPkgAction,
    },

    /// Show the mmpm environment
    Env,

    /// Serve the JSON API
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 7891)]
        port: u16,
    },

    /// Generate shell completions
    Completion {
        shell: Shell,
    },

    /// Print the mmpm version
    Version,
}

#[derive(clap::Args)]
#[group(required = true, multiple = false)]
struct ListArgs {
    /// Every package
    #[arg(short, long)]
    all: bool,
    /// Installed packages
    #[arg(short, long)]
    installed: bool,
    /// Packages that are not installed
    #[arg(short, long)]
    exclude_installed: bool,
    /// Category names
    #[arg(short = 'C', long)]
    categories: bool,
    /// Packages with an upgrade available
    #[arg(short, long)]
    upgradable: bool,
}

impl ListArgs {
    fn filter(&self) -> ListFilter {
        if self.installed {
            ListFilter::Installed
        } else if self.exclude_installed {
            ListFilter::ExcludeInstalled
        } else if self.categories {
            ListFilter::Categories
        } else if self.upgradable {
            ListFilter::Upgradable
        } else {
            ListFilter::All
        }
    }
}

#[derive(clap::Args)]
#[group(required = true)]
struct DbArgs {
    /// Scrape the wiki now, ignoring the cache expiration
    #[arg(short, long)]
    refresh: bool,
    /// Print cache metadata
    #[arg(short, long)]
    info: bool,
    /// Print every package as JSON
    #[arg(short, long)]
    dump: bool,
}

#[derive(Subcommand)]
enum MmPkgAction {
    /// Register a package, asking for missing fields
    Add {
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        author: Option<String>,
        #[arg(short, long)]
        repository: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Unregister packages by title
    Remove {
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(short, long)]
        yes: bool,
    },
}

/// `-v` wins over the configured level; `-q` turns logging off.
fn log_level(global: &GlobalOptions, configured: &str) -> &'static str {
    match (global.quiet, global.verbose) {
        (true, _) => "off",
        (false, 0) => match configured.trim().to_uppercase().as_str() {
            "TRACE" => "trace",
            "DEBUG" => "debug",
            "WARN" | "WARNING" => "warn",
            "ERROR" | "CRITICAL" | "FATAL" => "error",
            _ => "info",
        },
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.global.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }
    mmpm_diagnostics::setup(!cli.global.no_color);

    match cli.command {
        Commands::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "mmpm", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Version => {
            commands::version();
            return Ok(());
        }
        _ => {}
    }

    let serving = matches!(cli.command, Commands::Serve { .. });
    let prompter: Arc<dyn Prompter> = if serving {
        Arc::new(AssumeYes)
    } else {
        Arc::new(prompt::TermPrompter::new())
    };

    let session = Session::open(cli.global.quiet || serving, prompter)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level(&cli.global, &session.env.log_level())))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Install { names, yes } => commands::install(&session, &names, yes).await?,
        Commands::Remove { names, yes } => commands::remove(&session, &names, yes).await?,
        Commands::Search {
            query,
            case_sensitive,
            title_only,
        } => commands::search(&session, &query, case_sensitive, title_only).await?,
        Commands::Show { names, remote } => commands::show(&session, &names, remote).await?,
        Commands::List { filter, title_only } => {
            commands::list(&session, filter.filter(), title_only).await?
        }
        Commands::Update => commands::update(&session).await?,
        Commands::Upgrade { names, yes } => commands::upgrade(&session, &names, yes).await?,
        Commands::Db { action } => {
            commands::db(&session, action.refresh, action.info, action.dump).await?
        }
        Commands::MmPkg { action } => match action {
            MmPkgAction::Add {
                title,
                author,
                repository,
                description,
            } => commands::mm_pkg_add(&session, title, author, repository, description).await?,
            MmPkgAction::Remove { names, yes } => {
                commands::mm_pkg_remove(&session, &names, yes).await?
            }
        },
        Commands::Env => commands::env(&session)?,
        Commands::Serve { host, port } => {
            session.load(false).await?;
            let state = Arc::new(api::ApiState {
                catalog: session.catalog.clone(),
                host: Arc::new(session.host()),
            });
            api::serve(state, &host, port).await?;
        }
        Commands::Completion { .. } | Commands::Version => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_list_requires_one_filter() {
        assert!(Cli::try_parse_from(["mmpm", "list"]).is_err());
        assert!(Cli::try_parse_from(["mmpm", "list", "--all", "--installed"]).is_err());

        let cli = Cli::try_parse_from(["mmpm", "list", "--upgradable", "-t"]).unwrap();
        match cli.command {
            Commands::List { filter, title_only } => {
                assert_eq!(filter.filter(), ListFilter::Upgradable);
                assert!(title_only);
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_mm_pkg_add_flags() {
        let cli =
            Cli::try_parse_from(["mmpm", "mm-pkg", "add", "-t", "MMM-Mine", "-r", "https://x/y"])
                .unwrap();
        match cli.command {
            Commands::MmPkg {
                action: MmPkgAction::Add { title, repository, author, .. },
            } => {
                assert_eq!(title.as_deref(), Some("MMM-Mine"));
                assert_eq!(repository.as_deref(), Some("https://x/y"));
                assert_eq!(author, None);
            }
            _ => panic!("expected mm-pkg add"),
        }
    }

    #[test]
    fn test_show_remote_flag() {
        let cli = Cli::try_parse_from(["mmpm", "show", "MMM-Clock", "--remote"]).unwrap();
        assert!(matches!(cli.command, Commands::Show { remote: true, .. }));

        let cli = Cli::try_parse_from(["mmpm", "show", "MMM-Clock", "MMM-News"]).unwrap();
        match cli.command {
            Commands::Show { names, remote } => {
                assert_eq!(names, vec!["MMM-Clock", "MMM-News"]);
                assert!(!remote);
            }
            _ => panic!("expected show"),
        }
    }

    #[test]
    fn test_log_filter_levels() {
        let global = |verbose, quiet| GlobalOptions {
            verbose,
            quiet,
            no_color: false,
        };

        assert_eq!(log_level(&global(0, false), "WARNING"), "warn");
        assert_eq!(log_level(&global(0, false), "bogus"), "info");
        assert_eq!(log_level(&global(2, false), "ERROR"), "debug");
        assert_eq!(log_level(&global(3, true), "INFO"), "off");
    }
}
