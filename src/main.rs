//! subdub - video translation task manager client
//!
//! Entry point for the command-line client: logs in to the task server,
//! then lists, creates and inspects tasks, uploads videos, edits subtitles
//! and requests voice generation.

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::{non_blocking, rolling};

use subdub::api::{HttpTaskApi, TaskApi, UploadRequest};
use subdub::cli::{Args, Commands};
use subdub::config::Config;
use subdub::console::{render_view, run_console};
use subdub::download::{default_destination, download_artifact};
use subdub::error::DeskError;
use subdub::poller::{fetch_task, RefreshHandle, TaskEvent, TaskPoller};
use subdub::session::{EditorSession, GenerateOutcome};
use subdub::subtitle::generate_srt;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let config = load_config(&args)?;

    // Setup logging to both console and file
    setup_logging(args.verbose, &config)?;

    let api: Arc<dyn TaskApi> = Arc::new(HttpTaskApi::new(&config.server)?);

    if let Some((username, password)) = config.server.credentials() {
        let user = api.login(username, password).await?.into_result()
            .map_err(|e| DeskError::Auth(e.to_string()))?;
        info!("Logged in as {}", user.username);
    }

    match args.command {
        Commands::Whoami => {
            let user = api.current_user().await?.into_result()
                .map_err(|e| DeskError::Auth(e.to_string()))?;
            println!("{} ({})", user.username, user.id);
        }
        Commands::Tasks => {
            let tasks = api.list_tasks().await?.into_result()?.tasks;

            if tasks.is_empty() {
                println!("No tasks found.");
            } else {
                println!("{:<34} {:<30} {:<12} {:<20}", "ID", "Title", "Status", "Last used");
                println!("{}", "-".repeat(98));
                for task in tasks {
                    println!("{:<34} {:<30} {:<12} {:<20}",
                        task.id,
                        truncate(&task.title, 30),
                        task.overall_status().to_string(),
                        task.last_used
                    );
                }
            }
        }
        Commands::Show { task } => {
            let task = fetch_task(api.as_ref(), &task).await?;

            println!("\n{} ({})", task.title, task.id);
            println!("Created:     {} by {}", task.creation_date, task.creator_username);
            println!("Languages:   {} -> {}", task.lang_from, task.lang_to);
            println!("Subtitles:   {}", task.subs_generation_status);
            println!("Voice:       {}", task.voice_generation_status);

            let artifacts = task.artifacts();
            if !artifacts.is_empty() {
                println!("\nResults:");
                for artifact in artifacts {
                    println!("  {:<22} {}", artifact.label, artifact.path);
                }
            }
        }
        Commands::Create { title } => {
            let creator = api.current_user().await?.into_result()
                .map_err(|e| DeskError::Auth(e.to_string()))?
                .username;
            let created = api.create_task(&title, &creator).await?.into_result()?;
            match created.task_id {
                Some(task_id) => println!("Created task {}", task_id),
                None => println!("Created task"),
            }
        }
        Commands::Delete { task } => {
            api.delete_task(&task).await?.into_result()?;
            println!("Deleted task {}", task);
        }
        Commands::Upload { task, video, lang_from, lang_to } => {
            info!("Uploading video: {}", video.display());
            let request = UploadRequest {
                task_id: task,
                lang_from,
                lang_to,
                video_path: video,
            };
            request.validate()?;
            api.create_subs(&request).await?.into_result()?;
            println!("Upload accepted; subtitle generation queued for task {}", request.task_id);
        }
        Commands::Subs { task, srt } => {
            let subs = api.get_json_subs(&task).await?.into_result()?.json_subs;

            match srt {
                Some(path) => {
                    generate_srt(&subs, &path).await?;
                    println!("Wrote {} subtitles to {}", subs.len(), path.display());
                }
                None => {
                    for sub in &subs {
                        println!("#{:<5} {} --> {} [{}] {}", sub.id, sub.start, sub.end, sub.speaker, sub.text);
                    }
                }
            }
        }
        Commands::Generate { task } => {
            let data = fetch_task(api.as_ref(), &task).await?;
            let (_sender, receiver) = tokio::sync::watch::channel(data);
            let session = EditorSession::open(
                Arc::clone(&api),
                receiver,
                RefreshHandle::new(),
                config.editor.autosave_interval(),
            ).await;

            let outcome = session.generate_voice().await;
            session.close();
            match outcome? {
                GenerateOutcome::Queued => println!("Voice generation requested for task {}", task),
                GenerateOutcome::Blocked => {
                    print!("{}", render_view(&session.view()));
                    return Err(DeskError::Api("Subtitle format is wrong; voice generation not requested".to_string()).into());
                }
                GenerateOutcome::Failed(message) => return Err(DeskError::Api(message).into()),
                GenerateOutcome::Discarded => {}
            }
        }
        Commands::Download { path, output } => {
            let output = match output {
                Some(output) => output,
                None => default_destination(&path, &std::env::current_dir()?)?,
            };
            download_artifact(api.as_ref(), &path, &output).await?;
        }
        Commands::Watch { task } => {
            let data = fetch_task(api.as_ref(), &task).await?;
            watch_task(api, data, &config).await;
        }
        Commands::Edit { task } => {
            let data = fetch_task(api.as_ref(), &task).await?;
            run_console(api, data, &config).await?;
        }
    }

    Ok(())
}

/// Load configuration: explicit path, then ./subdub.toml, then defaults
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("subdub.toml").exists() {
                Config::from_file("subdub.toml")?
            } else {
                Config::default()
            }
        }
    };

    if let Some(server) = &args.server {
        config.server.url = server.clone();
    }
    if let Some(username) = &args.username {
        config.server.username = Some(username.clone());
    }
    if let Some(password) = &args.password {
        config.server.password = Some(password.clone());
    }
    config.validate()?;

    Ok(config)
}

/// Follow a task with a spinner until voice generation returns to idle
async fn watch_task(api: Arc<dyn TaskApi>, task: subdub::task::TaskData, config: &Config) {
    let mut poller = TaskPoller::start(api, task, config.poller.interval());
    let mut events = poller.events();
    let latest = poller.latest();

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner()));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("{}: subtitles {}, voice {}",
        latest.title, latest.subs_generation_status, latest.voice_generation_status));

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(TaskEvent::StatusChanged { previous, current, at }) => {
                    pb.println(format!("{} voice generation {} -> {}", at.format("%H:%M:%S"), previous, current));
                    let latest = poller.latest();
                    pb.set_message(format!("{}: subtitles {}, voice {}",
                        latest.title, latest.subs_generation_status, latest.voice_generation_status));
                }
                Ok(TaskEvent::VoiceGenerationFinished { .. }) => {
                    pb.finish_with_message("Voice generation finished");
                    break;
                }
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} task events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                pb.abandon_with_message("Stopped watching");
                break;
            }
        }
    }

    poller.stop();
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool, config: &Config) -> Result<()> {
    // Create log directory
    let log_dir = &config.logging.dir;
    std::fs::create_dir_all(log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(log_dir, "subdub.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    // Determine log level
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console output goes to stderr so command output stays clean
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    // Create file layer
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    // Setup layered subscriber
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer);

    // Initialize the subscriber
    subscriber.try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("subdub.log").display());

    Ok(())
}
