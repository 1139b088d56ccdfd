//! Demo CLI: `tartape record <dir>` commits a snapshot, `tartape play <dir>
//! [--from OFFSET]` streams it to stdout.
//!
//! A thin `structopt`-derived CLI shape; all real work is delegated to the
//! library.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use structopt::StructOpt;
use tartape::{Event, Tape, TapePlayer, TapeRecorder, TartapeError};

#[derive(StructOpt)]
#[structopt(name = "tartape", about = "Deterministic, resumable USTAR archive streamer")]
enum Cli {
    /// Walk `root` and commit a snapshot under `root/.tartape/index.db`.
    Record {
        #[structopt(parse(from_os_str))]
        root: PathBuf,
    },
    /// Replay a committed snapshot against `root` as a USTAR byte stream on stdout.
    Play {
        #[structopt(parse(from_os_str))]
        root: PathBuf,
        #[structopt(long, default_value = "0")]
        from: u64,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "tartape failed");
            eprintln!("tartape: {e}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// One distinct non-zero code per error kind (§6/§7), so a caller scripting
/// this demo binary can distinguish failure modes without parsing stderr.
fn exit_code(err: &TartapeError) -> u8 {
    match err {
        TartapeError::PathTooLong { .. } => 2,
        TartapeError::DirectoryNameTooLong { .. } => 3,
        TartapeError::UnsupportedKind { .. } => 4,
        TartapeError::SnapshotCorrupt { .. } => 5,
        TartapeError::Integrity { .. } => 6,
        TartapeError::Io(_) => 7,
        TartapeError::InvalidOffset { .. } => 8,
    }
}

fn run() -> tartape::Result<()> {
    match Cli::from_args() {
        Cli::Record { root } => {
            let fingerprint = TapeRecorder::new(root).commit()?;
            println!("{}", hex::encode(fingerprint));
            Ok(())
        }
        Cli::Play { root, from } => {
            let tape = Tape::discover(root.clone())?;
            let player = TapePlayer::new(&tape, root);
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for event in player.play(from)? {
                if let Event::FileData { bytes } = event? {
                    out.write_all(&bytes)?;
                }
            }
            out.flush()?;
            Ok(())
        }
    }
}
