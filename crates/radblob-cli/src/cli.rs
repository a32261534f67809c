use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "radblob",
    about = "Content-addressed blob stores: loose directories and ZIP archives",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Configuration file (default: ./radblob.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List blobs, cascading over several stores
    Ls(LsArgs),
    /// Fetch a blob by ID
    Get(GetArgs),
    /// Add files to a store under their content IDs
    Put(PutArgs),
    /// Pack a loose directory into a new archive
    Pack(PackArgs),
    /// Unpack an archive into a loose directory
    Unpack(UnpackArgs),
    /// Print the content ID of a file without storing it
    Id(IdArgs),
    /// Show archive statistics
    Info(InfoArgs),
}

#[derive(Args)]
pub struct LsArgs {
    /// Stores in priority order
    #[arg(required = true)]
    pub stores: Vec<PathBuf>,
}

#[derive(Args)]
pub struct GetArgs {
    pub id: String,
    /// Stores in priority order
    #[arg(short, long = "store", required = true)]
    pub stores: Vec<PathBuf>,
    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct PutArgs {
    pub store: PathBuf,
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    #[arg(long, default_value = "")]
    pub prefix: String,
    #[arg(long, default_value = "")]
    pub ext: String,
}

#[derive(Args)]
pub struct PackArgs {
    pub dir: PathBuf,
    pub archive: PathBuf,
}

#[derive(Args)]
pub struct UnpackArgs {
    pub archive: PathBuf,
    pub dir: PathBuf,
}

#[derive(Args)]
pub struct IdArgs {
    pub file: PathBuf,
    #[arg(long, default_value = "")]
    pub prefix: String,
    #[arg(long, default_value = "")]
    pub ext: String,
}

#[derive(Args)]
pub struct InfoArgs {
    pub archive: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ls_multiple_stores() {
        let cli = Cli::try_parse_from(["radblob", "ls", "a.zip", "blobs/"]).unwrap();
        if let Command::Ls(args) = cli.command {
            assert_eq!(args.stores, vec![PathBuf::from("a.zip"), PathBuf::from("blobs/")]);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_ls_requires_store() {
        assert!(Cli::try_parse_from(["radblob", "ls"]).is_err());
    }

    #[test]
    fn parse_get() {
        let cli = Cli::try_parse_from([
            "radblob", "get", "ABC_1.radblob.raw", "-s", "one.zip", "--store", "two", "-o", "out.bin",
        ])
        .unwrap();
        if let Command::Get(args) = cli.command {
            assert_eq!(args.id, "ABC_1.radblob.raw");
            assert_eq!(args.stores.len(), 2);
            assert_eq!(args.output, Some(PathBuf::from("out.bin")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_put_with_prefix() {
        let cli = Cli::try_parse_from([
            "radblob", "put", "store.zip", "a.bin", "b.bin", "--prefix", "tex", "--ext", "png",
        ])
        .unwrap();
        if let Command::Put(args) = cli.command {
            assert_eq!(args.files.len(), 2);
            assert_eq!(args.prefix, "tex");
            assert_eq!(args.ext, "png");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_put_defaults() {
        let cli = Cli::try_parse_from(["radblob", "put", "dir/", "a.bin"]).unwrap();
        if let Command::Put(args) = cli.command {
            assert!(args.prefix.is_empty());
            assert!(args.ext.is_empty());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_pack_unpack() {
        let cli = Cli::try_parse_from(["radblob", "pack", "dir", "out.zip"]).unwrap();
        assert!(matches!(cli.command, Command::Pack(_)));
        let cli = Cli::try_parse_from(["radblob", "unpack", "in.zip", "dir"]).unwrap();
        assert!(matches!(cli.command, Command::Unpack(_)));
    }

    #[test]
    fn parse_verbose_and_config() {
        let cli = Cli::try_parse_from(["radblob", "--verbose", "--config", "c.toml", "info", "a.zip"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["radblob", "--format", "json", "id", "file"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
    }
}
