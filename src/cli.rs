use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "melody-check",
    about = "Recognize the notes of a mono WAV recording and check them against a score"
)]
pub struct Cli {
    /// TOML settings file (defaults apply to anything it leaves out)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the note segments of a recording
    Segment {
        /// Mono PCM16 or float32 WAV file
        input: PathBuf,

        /// One recording per reference note, in id order; without these an
        /// equal-tempered set from the settings is used
        #[arg(short, long, num_args = 1..)]
        reference: Vec<PathBuf>,
    },

    /// Follow a recording against an expected melody
    Follow {
        /// Mono PCM16 or float32 WAV file
        input: PathBuf,

        /// Score file: one `<pitch> [duration]` pair per line
        score: PathBuf,
    },
}
