/// Command line frontend for the b2h conversion backend.
/// Parses the flag surface, wires Ctrl+C into the cancellation token and maps
/// converter outcomes to exit codes.
use std::path::PathBuf;
use std::process;

use clap::Parser;

use b2h::cancel::CancelToken;
use b2h::convert::{self, ConvertError, Eol, Options, Status, WordWidth};
use b2h::params;
use b2h::paths;

/// ANSI escape codes for coloured output
pub const DEFAULT: &str = "\x1b[0m";
pub const WHITE: &str = "\x1b[38;5;15m";
pub const ORANGE: &str = "\x1b[38;5;208m";
pub const GREEN: &str = "\x1b[38;5;40m";

/// Store a binary file as a static array in a C/C++ header.
#[derive(Parser)]
#[command(author, version, long_about = None)]
struct Cli {
    /// Binary file to embed.
    file: PathBuf,

    /// Destination header. Defaults to the input basename with '.h' appended,
    /// next to the input.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Identifier for the stored array. Defaults to the sanitized output name.
    #[arg(long, short = 'n')]
    name: Option<String>,

    /// Read buffer size in bytes, realigned down to whole words.
    #[arg(long, short = 's', default_value_t = params::CHUNK_SIZE)]
    chunk_size: usize,

    /// Number of source bytes written per line.
    #[arg(long, short = 'd', default_value_t = params::BYTES_PER_LINE)]
    bytes_per_line: usize,

    /// Pack bytes into 8, 16 or 32 bit integers.
    #[arg(long, short = 'w', default_value = "8", value_parser = parse_word_size)]
    word_size: WordWidth,

    /// Swap the byte order within each packed word.
    #[arg(long)]
    swap: bool,

    /// Trail each line with its printable content in a comment.
    #[arg(long, short = 'c')]
    content: bool,

    /// Position at which to start reading.
    #[arg(long, default_value_t = 0)]
    offset: u64,

    /// Number of bytes to process. 0 processes up to end of file.
    #[arg(long, default_value_t = 0)]
    length: u64,

    /// Additionally store the data in a std::vector for C++.
    #[arg(long)]
    stdvector: bool,

    /// End of line style: lf, cr or crlf.
    #[arg(long, default_value = "lf")]
    eol: String,
}

/// Convert the '-w' bit length into a word width.
fn parse_word_size(arg: &str) -> Result<WordWidth, String> {
    let bits: usize = arg
        .parse()
        .map_err(|_| String::from("word size must be a number"))?;

    WordWidth::try_from(bits).map_err(String::from)
}

/// Parse the '--eol' value, falling back to LF with a warning on unknown
/// styles instead of refusing the run.
fn resolve_eol(arg: &str) -> Eol {
    arg.parse().unwrap_or_else(|_| {
        println!("\n{ORANGE}WARNING: {DEFAULT}Unknown EOL type \"{arg}\", using default \"lf\"\n");
        Eol::Lf
    })
}

/// Map converter failures to stable shell exit codes.
fn exit_code(err: &ConvertError) -> i32 {
    match err {
        ConvertError::NotFound(_) => 1,
        ConvertError::InvalidRange { .. } => 3,
        ConvertError::Io(_) => 4,
    }
}

fn main() {
    let cli = Cli::parse();

    let opts = Options {
        source: paths::normalize_path(&cli.file),
        output: cli.output,
        name: cli.name,
        offset: cli.offset,
        length: cli.length,
        chunk_size: cli.chunk_size,
        bytes_per_line: cli.bytes_per_line,
        word_width: cli.word_size,
        swap: cli.swap,
        content: cli.content,
        stdvector: cli.stdvector,
        eol: resolve_eol(&cli.eol),
    };

    let cancel = CancelToken::new();
    let handle = cancel.clone();
    ctrlc::set_handler(move || {
        handle.cancel();
        println!("\nStopping conversion...");
    })
    .expect("Failed to set CTRL+C handler.");

    match convert::convert(&opts, &cancel) {
        Ok(report) => {
            println!(
                "\nWrote {WHITE}{}{DEFAULT} bytes in {}.{:03}s",
                report.bytes_written,
                report.elapsed.as_secs(),
                report.elapsed.subsec_millis()
            );

            if report.status == Status::Cancelled {
                println!("{ORANGE}Conversion cancelled, partial header kept.{DEFAULT}");
                process::exit(130);
            }

            println!("{GREEN}Exported to:{DEFAULT} {}", report.output.display());
        }
        Err(err) => {
            eprintln!("{ORANGE}ERROR: {err}{DEFAULT}");
            process::exit(exit_code(&err));
        }
    }
}
