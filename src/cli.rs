use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Task server URL (overrides the config file)
    #[arg(long)]
    pub server: Option<String>,

    /// Account name to log in with
    #[arg(short, long)]
    pub username: Option<String>,

    /// Account password
    #[arg(short, long)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the logged-in user
    Whoami,

    /// List all tasks with their overall status
    Tasks,

    /// Show one task and its artifacts
    Show {
        /// Task identifier
        #[arg(short, long)]
        task: String,
    },

    /// Create a new task
    Create {
        /// Task title
        #[arg(short, long)]
        title: String,
    },

    /// Delete a task
    Delete {
        /// Task identifier
        #[arg(short, long)]
        task: String,
    },

    /// Upload the source video and start subtitle generation
    Upload {
        /// Task identifier
        #[arg(short, long)]
        task: String,

        /// Source video (.mp4)
        #[arg(long)]
        video: PathBuf,

        /// Spoken language of the video
        #[arg(long, default_value = "en")]
        lang_from: String,

        /// Language to translate into
        #[arg(long)]
        lang_to: String,
    },

    /// Print the task's subtitles, optionally exporting them as SRT
    Subs {
        /// Task identifier
        #[arg(short, long)]
        task: String,

        /// Write the subtitles to this SRT file
        #[arg(long)]
        srt: Option<PathBuf>,
    },

    /// Save subtitles and request voice generation
    Generate {
        /// Task identifier
        #[arg(short, long)]
        task: String,
    },

    /// Download a task artifact
    Download {
        /// Artifact path as reported by `show`
        #[arg(long)]
        path: String,

        /// Output file (defaults to the artifact's file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Follow a task's status until voice generation finishes
    Watch {
        /// Task identifier
        #[arg(short, long)]
        task: String,
    },

    /// Edit subtitles interactively with autosave
    Edit {
        /// Task identifier
        #[arg(short, long)]
        task: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_upload() {
        let args = Args::try_parse_from([
            "subdub", "-u", "anna", "upload", "--task", "t1", "--video", "clip.mp4", "--lang-to", "de",
        ])
        .unwrap();
        assert_eq!(args.username.as_deref(), Some("anna"));
        match args.command {
            Commands::Upload { task, lang_from, lang_to, .. } => {
                assert_eq!(task, "t1");
                assert_eq!(lang_from, "en");
                assert_eq!(lang_to, "de");
            }
            _ => panic!("expected upload"),
        }
    }
}
