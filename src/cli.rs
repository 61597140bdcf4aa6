//! CLI definitions for crawlset.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// crawlset CLI.
#[derive(Parser)]
#[command(name = "crawlset")]
#[command(about = "Annotated screenshot dataset collector for live web apps")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "crawlset.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run a crawl and write the dataset (default)
    Run,

    /// Check the configuration file and exit
    Validate,

    /// Draw a dataset's boxes over its images
    Visualize {
        /// Folder holding the images and one dataset JSON file
        folder: PathBuf,

        /// Output directory (default: <folder>/overlays)
        #[arg(long)]
        save: Option<PathBuf>,

        /// Comma-separated image file names to render
        #[arg(long)]
        subset: Option<String>,

        /// Fixed outline thickness in pixels
        #[arg(long)]
        line_width: Option<u32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_run() {
        let cli = Cli::try_parse_from(["crawlset"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("crawlset.toml"));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["crawlset", "validate", "--config", "site.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("site.toml"));
        assert!(matches!(cli.command, Some(Commands::Validate)));
    }

    #[test]
    fn test_visualize_args() {
        let cli = Cli::try_parse_from([
            "crawlset",
            "visualize",
            "out",
            "--subset",
            "a.png,b.png",
            "--line-width",
            "3",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Visualize {
                folder,
                save,
                subset,
                line_width,
            }) => {
                assert_eq!(folder, PathBuf::from("out"));
                assert!(save.is_none());
                assert_eq!(subset.as_deref(), Some("a.png,b.png"));
                assert_eq!(line_width, Some(3));
            }
            _ => panic!("expected visualize"),
        }
    }
}
