// src/main.rs

mod cli;

use clap::Parser;
use cli::{Args, Command};
use git_version_analyzer::analyzer::AnalyzeOptions;
use git_version_analyzer::archive::{self, ArchiveExtractor};
use git_version_analyzer::callback::{self, CallbackListener};
use git_version_analyzer::clone::CloneCache;
use git_version_analyzer::config::AppConfig;
use git_version_analyzer::github::GitHubClient;
use git_version_analyzer::model::{AnalysisOutcome, PublicIdentity};
use git_version_analyzer::server::{self, AppState};
use git_version_analyzer::session::{IdentityStore, SessionManager};
use git_version_analyzer::shell::{self, FileFilter, HostDialogs, TerminalDialogs};
use git_version_analyzer::{locator, logging, Error, Result};
use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

fn main() {
    let args = Args::parse();
    logging::init(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = AppConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Analyze { path, limit, json } => {
            let options = AnalyzeOptions {
                commit_limit: limit.unwrap_or(config.analysis.commit_limit),
                show_progress: !json,
            };
            let start_time = Instant::now();
            let outcome = locator::locate(&path, &options)?;
            print_outcome(&outcome, json)?;
            if !json {
                println!("Analysis finished in {:.2?}.", start_time.elapsed());
            }
        }
        Command::Extract { archive, analyze, json } => {
            let extractor = extractor(&config);
            let start_time = Instant::now();
            let result = extractor.extract(&archive, &Uuid::new_v4().to_string());
            if json && !analyze {
                let report = archive::ExtractionResult::from(&result);
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            let extraction = result?;
            if !json {
                println!(
                    "Extracted {} archive to {} in {:.2?}.",
                    extraction.kind.label(),
                    extraction.extracted_path.display(),
                    start_time.elapsed()
                );
            }
            if analyze {
                let options = AnalyzeOptions {
                    commit_limit: config.analysis.commit_limit,
                    show_progress: !json,
                };
                print_outcome(&locator::locate(&extraction.extracted_path, &options)?, json)?;
            }
        }
        Command::ArchiveInfo { archive } => {
            let info = archive::archive_info(&archive)?;
            println!("Name:      {}", info.name);
            println!("Size:      {} ({} bytes)", info.size_formatted, info.size);
            println!("Type:      {}", info.extension);
            println!("Supported: {}", if info.supported { "yes" } else { "no" });
            if let Some(modified) = info.modified {
                println!("Modified:  {}", modified.to_rfc2822());
            }
        }
        Command::Clone { url, name, full, keep, json } => {
            let name = name.unwrap_or_else(|| repo_name_from_url(&url));
            let session = SessionManager::load(IdentityStore::new(config.storage.identity_path()))?;
            let cache = CloneCache::new(config.storage.clones_dir());

            let start_time = Instant::now();
            let handle = cache.clone_repository(&url, &name, session.access_token(), full)?;
            if !json {
                println!("Cloned {} in {:.2?}.", name, start_time.elapsed());
            }
            let options = AnalyzeOptions {
                commit_limit: config.analysis.commit_limit,
                show_progress: !json,
            };
            let outcome = locator::locate(&handle.local_path, &options);
            if !keep {
                cache.cleanup(&handle.local_path)?;
            } else if !json {
                println!("Clone kept at {}", handle.local_path.display());
            }
            print_outcome(&outcome?, json)?;
        }
        Command::Cleanup { path, all } => {
            let cache = CloneCache::new(config.storage.clones_dir());
            match path {
                Some(path) if !all => {
                    let target = if path.is_absolute() { path } else { cache.root().join(path) };
                    if cache.cleanup(&target)? {
                        println!("Removed {}", target.display());
                    } else {
                        return Err(Error::not_found(format!("clone {}", target.display())));
                    }
                }
                _ => {
                    let count = cache.cleanup_all()?;
                    println!("{} repositories cleaned up", count);
                }
            }
        }
        Command::Serve { host, port } => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;
            let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
                .parse()
                .map_err(|e| Error::Config(format!("invalid listen address: {}", e)))?;
            let state = AppState::new(config)?;
            runtime()?.block_on(server::serve(state, addr))?;
        }
        Command::Login { guest, manual, email, github } => {
            let store = IdentityStore::new(config.storage.identity_path());
            let previous = SessionManager::load(store.clone())?
                .identity()
                .map(|identity| identity.username.clone());
            // The stored identity is only replaced once the new login succeeds
            let mut session = SessionManager::fresh(store);
            let identity = if guest {
                PublicIdentity::from(session.login_guest()?)
            } else if manual {
                PublicIdentity::from(session.login_manual(email, github)?)
            } else {
                runtime()?.block_on(github_login(&config, &mut session))?
            };
            if let Some(previous) = previous {
                println!("Replaced previous identity {}", previous);
            }
            println!("Signed in as {} ({:?})", identity.display_name, identity.login_type);
        }
        Command::Logout => {
            let store = IdentityStore::new(config.storage.identity_path());
            let mut session = SessionManager::load(store)?;
            match session.logout()? {
                Some(identity) => println!("Signed out {}", identity.username),
                None => println!("Not signed in"),
            }
        }
        Command::Whoami => {
            let session = SessionManager::load(IdentityStore::new(config.storage.identity_path()))?;
            match session.public_identity() {
                Some(identity) => println!("{}", serde_json::to_string_pretty(&identity)?),
                None => println!("Not signed in"),
            }
        }
        Command::Interactive => interactive(&config)?,
    }

    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?)
}

fn extractor(config: &AppConfig) -> ArchiveExtractor {
    ArchiveExtractor::new(config.storage.extracted_dir()).with_programs(
        config.extraction.unrar_program.clone(),
        config.extraction.sevenzip_program.clone(),
    )
}

fn print_outcome(outcome: &AnalysisOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        print!("{}", shell::render_outcome(outcome));
    }
    Ok(())
}

fn repo_name_from_url(url: &str) -> String {
    let last = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(url);
    last.trim_end_matches(".git").to_string()
}

async fn github_login(config: &AppConfig, session: &mut SessionManager) -> Result<PublicIdentity> {
    if config.github.client_id.is_empty() {
        return Err(Error::Config(
            "set GITHUB_CLIENT_ID (or github.client_id) to sign in with GitHub".to_string(),
        ));
    }
    let client = GitHubClient::new(config.github.clone())?;
    let listener = CallbackListener::bind(
        callback::callback_addr(&config.github.callback_url)?,
        &callback::callback_path(&config.github.callback_url)?,
    )
    .await?;

    let csrf_state = session.begin_github_login()?;
    let url = client.authorization_url(&csrf_state)?;
    println!("Open this URL in your browser to sign in:\n\n  {}\n", url);
    println!("Waiting for GitHub (Ctrl-C to cancel)...");

    let params = match listener.wait().await {
        Ok(params) => params,
        Err(err) => {
            session.cancel_login();
            return Err(err);
        }
    };
    session.verify_callback(params.state.as_deref())?;

    let exchanged = async {
        let token = client.exchange_code(&params.into_code()?).await?;
        let user = client.user(&token).await?;
        Ok::<_, Error>((token, user))
    }
    .await;
    match exchanged {
        Ok((token, user)) => Ok(PublicIdentity::from(session.complete_github_login(token, user)?)),
        Err(err) => {
            session.cancel_login();
            Err(err)
        }
    }
}

fn interactive(config: &AppConfig) -> Result<()> {
    println!("Analyze a [f]older or an [a]rchive? (empty to quit)");
    let mut choice = String::new();
    io::stdin().lock().read_line(&mut choice)?;

    let dialogs = TerminalDialogs::new(io::stdin().lock(), io::stdout());
    let options = AnalyzeOptions {
        commit_limit: config.analysis.commit_limit,
        show_progress: true,
    };

    match choice.trim().to_lowercase().as_str() {
        "f" | "folder" => {
            let Some(folder) = dialogs.pick_folder() else {
                return Ok(());
            };
            print_outcome(&locator::locate(&folder, &options)?, false)
        }
        "a" | "archive" => {
            let Some(file) = dialogs.pick_file(&[FileFilter::archives()]) else {
                return Ok(());
            };
            analyze_archive(config, &file, &options)
        }
        _ => Ok(()),
    }
}

fn analyze_archive(config: &AppConfig, file: &Path, options: &AnalyzeOptions) -> Result<()> {
    let extraction = extractor(config).extract(file, &Uuid::new_v4().to_string())?;
    let outcome = locator::locate(&extraction.extracted_path, options);
    archive::cleanup_extracted(&extraction.extracted_path)?;
    print_outcome(&outcome?, false)
}
