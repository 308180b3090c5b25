use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::transcribe::backend::BackendKind;

#[derive(Parser, Debug)]
#[command(
    name = "batchscribe",
    version,
    about = "Batch transcription of audio and video files through remote speech services"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcribe files and write one transcript per file
    Transcribe {
        /// Audio or video files, processed in the given order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Backend to use instead of the configured one
        #[arg(long, value_enum)]
        backend: Option<BackendKind>,

        /// Existing directory for transcripts
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Files in flight at once
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// List backends, their accepted formats and whether they are configured
    Backends,

    /// Write a commented default config file
    InitConfig {
        /// Where to write it (defaults to the platform config directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transcribe() {
        let cli = Cli::try_parse_from([
            "batchscribe",
            "transcribe",
            "a.wav",
            "b.mp3",
            "--backend",
            "azureadv",
            "--chunk-size",
            "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Transcribe {
                files,
                backend,
                dest,
                chunk_size,
            } => {
                assert_eq!(files, vec![PathBuf::from("a.wav"), PathBuf::from("b.mp3")]);
                assert_eq!(backend, Some(BackendKind::AzureAdvanced));
                assert!(dest.is_none());
                assert_eq!(chunk_size, Some(4));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_transcribe_requires_files() {
        assert!(Cli::try_parse_from(["batchscribe", "transcribe"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["batchscribe", "backends", "-c", "/tmp/x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
        assert!(matches!(cli.command, Commands::Backends));
    }
}
