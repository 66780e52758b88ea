use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, ErrorKind, Parser};
use env_logger::Env;
use indicatif::ProgressBar;
use log::{info, warn};

use rsync_delta::config::{Config, DEFAULT_CHANNEL_CAPACITY, DEFAULT_WINDOW_SIZE};
use rsync_delta::pipeline::{delta_flow, patch_flow, signature_flow};
use rsync_delta::strong_hash::StrongHashKind;
use rsync_delta::windowed_reader::ReadAt;

#[derive(Parser, Debug)]
#[clap(name = "rdiff", version, about)]
/// Simple CLI tool that replicates rdiff's signature, delta and patch commands
struct Cli {
    #[clap(long, global = true, default_value_t = DEFAULT_WINDOW_SIZE)]
    /// Block size in bytes. Signature and delta of a file must use the same value
    window_size: usize,
    #[clap(long, global = true, default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    /// How many messages may wait between two stages of a phase
    channel_capacity: usize,
    #[clap(long, global = true, value_enum, default_value_t = HashArg::Md4)]
    /// Strong hash of the signature blocks. Signature and delta of a file must use the same value
    strong_hash: HashArg,
    #[clap(long, global = true)]
    /// Do not draw progress bars
    no_progress: bool,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Generates a signature of <OLD_FILE> into <SIGNATURE_FILE> to be later used as a source for the "delta" command
    Signature {
        /// The source file of the signature
        old_file: PathBuf,
        /// The resulting signature file
        signature_file: PathBuf,
    },
    /// Generates the delta between a file described by <SIGNATURE_FILE> and <NEW_FILE> into <DELTA_FILE>
    Delta {
        /// The signature file describing the original content
        signature_file: PathBuf,
        /// The file with the (potentially) updated content
        new_file: PathBuf,
        /// The resulting delta file
        delta_file: PathBuf,
    },
    /// Applies <DELTA_FILE> on top of <BASIS_FILE> (not in place) and produces <NEW_FILE>
    Patch {
        /// The file the delta is going to be applied on
        basis_file: PathBuf,
        /// The delta file to apply
        delta_file: PathBuf,
        /// The resulting file
        new_file: PathBuf,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum HashArg {
    Md4,
    Md5,
}

impl From<HashArg> for StrongHashKind {
    fn from(arg: HashArg) -> Self {
        match arg {
            HashArg::Md4 => StrongHashKind::Md4,
            HashArg::Md5 => StrongHashKind::Md5,
        }
    }
}

/// Counts the bytes read through it on a progress bar.
struct Progress<R> {
    inner: R,
    bar: ProgressBar,
}

impl<R: ReadAt> ReadAt for Progress<R> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let n = self.inner.read_at(buf, offset)?;
        self.bar.inc(n as u64);
        Ok(n)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli: Cli = Cli::parse();

    let config = Config::new(cli.window_size, cli.channel_capacity, cli.strong_hash.into())?;
    let show_progress = !cli.no_progress;

    match cli.command {
        Commands::Signature {
            old_file,
            signature_file,
        } => {
            expect_file(&old_file, "old file");
            expect_no_file(&signature_file, "signature file");
            info!(
                "Generating signature of {} into {}",
                old_file.display(),
                signature_file.display()
            );

            let old = open(&old_file)?;
            let bar = progress_bar(&old, show_progress);
            let old = Progress { inner: old, bar };

            let blocks = with_output(&signature_file, |out| {
                Ok(signature_flow(&config, &old, out)?)
            })?;
            old.bar.finish_and_clear();
            info!("Wrote {} block signatures", blocks);
        }
        Commands::Delta {
            signature_file,
            new_file,
            delta_file,
        } => {
            expect_file(&signature_file, "signature file");
            expect_file(&new_file, "new file");
            expect_no_file(&delta_file, "delta file");
            info!(
                "Generating the delta between {} and {} into {}",
                signature_file.display(),
                new_file.display(),
                delta_file.display(),
            );

            let signature = fs::read(&signature_file)
                .with_context(|| format!("reading {}", signature_file.display()))?;
            let new = open(&new_file)?;
            let bar = progress_bar(&new, show_progress);
            let new = Progress { inner: new, bar };

            let stats = with_output(&delta_file, |out| {
                Ok(delta_flow(&config, &signature, &new, out)?)
            })?;
            new.bar.finish_and_clear();
            info!(
                "Reused {} of {} old blocks, {} new bytes sent as literals",
                stats.reused_block_count(),
                stats.reused_blocks.len(),
                stats.literal_bytes
            );
        }
        Commands::Patch {
            basis_file,
            delta_file,
            new_file,
        } => {
            expect_file(&basis_file, "basis file");
            expect_file(&delta_file, "delta file");
            expect_no_file(&new_file, "new file");
            info!(
                "Applying delta {} on top of {} into {}",
                delta_file.display(),
                basis_file.display(),
                new_file.display(),
            );

            let basis = open(&basis_file)?;
            let delta = open(&delta_file)?;
            let bar = progress_bar(&delta, show_progress);
            let delta = BufReader::new(bar.wrap_read(delta));

            let written = with_output(&new_file, |out| {
                Ok(patch_flow(&config, &basis, delta, out)?)
            })?;
            bar.finish_and_clear();
            info!("Wrote {} bytes", written);
        }
    }
    Ok(())
}

fn expect_file(path: &Path, what: &str) {
    if !path.is_file() {
        Cli::command()
            .error(
                ErrorKind::ValueValidation,
                format!("provided {} {} doesn't exist", what, path.display()),
            )
            .exit();
    }
}

fn expect_no_file(path: &Path, what: &str) {
    if path.exists() {
        Cli::command()
            .error(
                ErrorKind::ValueValidation,
                format!("provided {} {} already exists", what, path.display()),
            )
            .exit();
    }
}

fn open(path: &Path) -> anyhow::Result<File> {
    File::open(path).with_context(|| format!("opening {}", path.display()))
}

fn progress_bar(file: &File, enabled: bool) -> ProgressBar {
    match file.len_hint() {
        Some(len) if enabled => ProgressBar::new(len),
        _ => ProgressBar::hidden(),
    }
}

/// Runs `phase` against a freshly created `path`. The file is removed again if the phase fails,
/// a partial output is never left behind.
fn with_output<T, F>(path: &Path, phase: F) -> anyhow::Result<T>
where
    F: FnOnce(BufWriter<&File>) -> anyhow::Result<T>,
{
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let result = phase(BufWriter::new(&file)).and_then(|value| {
        file.sync_all()
            .with_context(|| format!("syncing {}", path.display()))?;
        Ok(value)
    });
    if result.is_err() {
        drop(file);
        if let Err(e) = fs::remove_file(path) {
            warn!("could not remove partial output {}: {}", path.display(), e);
        }
    }
    result.with_context(|| format!("producing {}", path.display()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cli_is_named_after_the_binary() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), "rdiff");
        let usage = Cli::command().render_usage().to_string();
        assert!(usage.contains("rdiff"), "{}", usage);
    }

    #[test]
    fn test_patch_arguments_are_positional() {
        let cli = Cli::try_parse_from(["rdiff", "--window-size", "16", "patch", "old", "delta", "new"])
            .unwrap();
        assert_eq!(cli.window_size, 16);
        assert!(matches!(
            cli.command,
            Commands::Patch { basis_file, .. } if basis_file == Path::new("old")
        ));
    }
}
