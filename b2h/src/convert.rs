/// Streaming converter turning a binary file into a C/C++ header.
/// The historical implementations configured this through a pile of global
/// setters; here a single immutable [`Options`] value describes the whole run.
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

use itertools::Itertools;

use crate::cancel::CancelToken;
use crate::params;
use crate::paths;

/// Number of consecutive source bytes packed into one emitted integer literal.
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum WordWidth {
    #[default]
    Byte = 1,
    Short = 2,
    Int = 4,
}

impl WordWidth {
    /// Word size in bytes.
    pub const fn bytes(self) -> usize {
        self as usize
    }

    /// Word size in bits, as exposed on the command line.
    pub const fn bits(self) -> usize {
        self as usize * 8
    }

    /// Number of hex digits in one formatted literal.
    pub const fn hex_digits(self) -> usize {
        self as usize * 2
    }

    /// C element type of the emitted array declaration.
    pub const fn c_type(self) -> &'static str {
        match self {
            WordWidth::Byte => "unsigned char",
            WordWidth::Short => "unsigned short",
            WordWidth::Int => "unsigned int",
        }
    }
}

/// Converts a command line bit length to the word width.
impl TryFrom<usize> for WordWidth {
    type Error = &'static str;

    fn try_from(bits: usize) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(WordWidth::Byte),
            16 => Ok(WordWidth::Short),
            32 => Ok(WordWidth::Int),
            _ => Err("Word size must be 8, 16 or 32 bits!"),
        }
    }
}

/// Line ending emitted between header lines.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum Eol {
    #[default]
    Lf,
    Cr,
    CrLf,
}

impl Eol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Eol::Lf => "\n",
            Eol::Cr => "\r",
            Eol::CrLf => "\r\n",
        }
    }
}

impl FromStr for Eol {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lf" => Ok(Eol::Lf),
            "cr" => Ok(Eol::Cr),
            "crlf" => Ok(Eol::CrLf),
            _ => Err("Unknown EOL type!"),
        }
    }
}

/// Full description of one conversion. Built once by the caller, never mutated.
#[derive(Clone, Debug)]
pub struct Options {
    /// Source binary file.
    pub source: PathBuf,
    /// Destination header. Defaults to the source basename with `.h` appended.
    pub output: Option<PathBuf>,
    /// Array identifier. Defaults to the sanitized output stem.
    pub name: Option<String>,
    /// Position at which to start reading.
    pub offset: u64,
    /// Number of bytes to process, 0 meaning up to end of file.
    pub length: u64,
    /// Read buffer granularity, realigned down to whole words.
    pub chunk_size: usize,
    /// Number of source bytes formatted onto each line.
    pub bytes_per_line: usize,
    pub word_width: WordWidth,
    /// Pack the first byte of each word into the least significant position.
    pub swap: bool,
    /// Trail each line with its printable rendition in a block comment.
    pub content: bool,
    /// Emit the C++ std::vector alias stanza.
    pub stdvector: bool,
    pub eol: Eol,
}

impl Options {
    pub fn new<P: Into<PathBuf>>(source: P) -> Options {
        Options {
            source: source.into(),
            output: None,
            name: None,
            offset: 0,
            length: 0,
            chunk_size: params::CHUNK_SIZE,
            bytes_per_line: params::BYTES_PER_LINE,
            word_width: WordWidth::default(),
            swap: false,
            content: false,
            stdvector: false,
            eol: Eol::default(),
        }
    }
}

/// Conversion failure classes surfaced to the frontend.
/// Cancellation is not a failure, it is reported through [`Report::status`].
#[derive(Debug)]
pub enum ConvertError {
    /// Source file does not exist or is not a regular file.
    NotFound(PathBuf),
    /// Read offset lies beyond the end of the source.
    InvalidRange { offset: u64, size: u64 },
    /// Read or write failure mid-stream. Partial output is left on disk.
    Io(io::Error),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::NotFound(path) => {
                write!(f, "File \"{}\" does not exist", path.display())
            }
            ConvertError::InvalidRange { offset, size } => {
                write!(f, "Offset {offset} is bigger than the file length {size}")
            }
            ConvertError::Io(err) => write!(f, "I/O failure: {err}"),
        }
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConvertError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ConvertError {
    fn from(err: io::Error) -> ConvertError {
        ConvertError::Io(err)
    }
}

/// Terminal state of a conversion.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Status {
    Completed,
    Cancelled,
}

/// Summary of a single conversion, discarded after being reported.
#[derive(Clone, Debug)]
pub struct Report {
    pub status: Status,
    /// Bytes pulled from the source.
    pub bytes_read: u64,
    /// Payload bytes packed into the array.
    pub bytes_written: u64,
    pub elapsed: Duration,
    /// Destination the header was written to.
    pub output: PathBuf,
}

/// Packs one word group into its integer value.
/// Natural order puts the first byte in the most significant position, swapped
/// order in the least significant. A pure shift composition on both paths, the
/// host byte order never comes into play.
fn pack_word(group: &[u8], swap: bool) -> u32 {
    if swap {
        group.iter().rev().fold(0, |word, &b| word << 8 | u32::from(b))
    } else {
        group.iter().fold(0, |word, &b| word << 8 | u32::from(b))
    }
}

/// Printable rendition of a data byte for the content comments.
const fn printable(b: u8) -> char {
    if b >= 0x20 && b <= 0x7E {
        b as char
    } else {
        '.'
    }
}

/// Streaming formatter for the header text.
/// Buffers one line worth of packed words so separators, trailing commas and
/// comment alignment are decided with the whole line in hand.
struct Encoder<W: Write> {
    out: W,
    width: WordWidth,
    swap: bool,
    content: bool,
    stdvector: bool,
    eol: &'static str,
    words_per_line: usize,
    /// Packed words of the current line.
    line: Vec<u32>,
    /// Printable rendition of the current line's bytes.
    comment: String,
    /// Words emitted so far.
    words: u64,
    /// Words the complete run would emit.
    total_words: u64,
}

impl<W: Write> Encoder<W> {
    fn new(out: W, opts: &Options, total_words: u64) -> Encoder<W> {
        Encoder {
            out,
            width: opts.word_width,
            swap: opts.swap,
            content: opts.content,
            stdvector: opts.stdvector,
            eol: opts.eol.as_str(),
            words_per_line: (opts.bytes_per_line / opts.word_width.bytes()).max(1),
            line: Vec::new(),
            comment: String::new(),
            words: 0,
            total_words,
        }
    }

    /// Payload bytes packed so far.
    fn bytes_written(&self) -> u64 {
        self.words * self.width.bytes() as u64
    }

    /// Writes the include guard opening, the optional vector support stanza and
    /// the array declaration.
    fn prologue(&mut self, ident: &str, guard: &str) -> io::Result<()> {
        let eol = self.eol;

        write!(self.out, "#ifndef {guard}{eol}#define {guard}{eol}")?;
        if self.stdvector {
            write!(
                self.out,
                "{eol}#ifdef __cplusplus{eol}#include <vector>{eol}#endif{eol}"
            )?;
        }
        write!(
            self.out,
            "{eol}static const {} {ident}[] = {{{eol}",
            self.width.c_type()
        )
    }

    /// Packs one word group onto the current line, flushing it when full or
    /// when this was the last word of the run.
    fn push_word(&mut self, group: &[u8]) -> io::Result<()> {
        self.line.push(pack_word(group, self.swap));
        if self.content {
            self.comment.extend(group.iter().map(|&b| printable(b)));
        }
        self.words += 1;

        if self.words == self.total_words {
            self.flush_line(true)
        } else if self.line.len() == self.words_per_line {
            self.flush_line(false)
        } else {
            Ok(())
        }
    }

    /// Terminates a line left open by cancellation.
    fn finish(&mut self) -> io::Result<()> {
        if self.line.is_empty() {
            Ok(())
        } else {
            self.flush_line(true)
        }
    }

    /// Writes out the buffered line. The last line drops the trailing comma and
    /// pads short groups so the content comments stay aligned.
    fn flush_line(&mut self, last: bool) -> io::Result<()> {
        let digits = self.width.hex_digits();
        let body = self
            .line
            .iter()
            .map(|word| format!("0x{word:0digits$x}"))
            .join(", ");

        write!(self.out, "\t{body}")?;
        if last {
            if self.content {
                // one formatted word costs "0x" + digits + ", "
                let pad = (self.words_per_line - self.line.len()) * (digits + 4);
                write!(self.out, "{:pad$}  /* {} */", "", self.comment)?;
            }
        } else {
            self.out.write_all(b",")?;
            if self.content {
                write!(self.out, " /* {} */", self.comment)?;
            }
        }
        self.out.write_all(self.eol.as_bytes())?;

        self.line.clear();
        self.comment.clear();
        Ok(())
    }

    /// Closes the array, emits the optional vector alias and the include guard
    /// closing, then flushes the destination.
    fn epilogue(&mut self, ident: &str, guard: &str) -> io::Result<()> {
        let eol = self.eol;

        write!(self.out, "}};{eol}")?;
        if self.stdvector {
            write!(
                self.out,
                "{eol}#ifdef __cplusplus{eol}static const std::vector<char> \
                 {ident}_v({ident}, {ident} + sizeof({ident}));{eol}#endif{eol}"
            )?;
        }
        write!(self.out, "{eol}#endif /* {guard} */{eol}")?;
        self.out.flush()
    }
}

/// Fills the buffer from the reader, coming up short only at end of stream.
fn read_chunk<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    Ok(filled)
}

/// Runs one full conversion described by `opts`, polling `cancel` per chunk and
/// per word. A cancelled run still closes the array and the include guard, so
/// the partial header on disk stays well-formed.
pub fn convert(opts: &Options, cancel: &CancelToken) -> Result<Report, ConvertError> {
    let timer = Instant::now();
    let word_bytes = opts.word_width.bytes();

    let meta = match fs::metadata(&opts.source) {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return Err(ConvertError::NotFound(opts.source.clone())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(ConvertError::NotFound(opts.source.clone()))
        }
        Err(err) => return Err(err.into()),
    };

    let size = meta.len();
    if opts.offset > size {
        return Err(ConvertError::InvalidRange { offset: opts.offset, size });
    }

    let output = match &opts.output {
        Some(path) => path.clone(),
        None => paths::default_output(&opts.source),
    };
    let ident = match &opts.name {
        Some(name) => paths::sanitize_identifier(name),
        None => paths::sanitize_identifier(&paths::header_stem(&output)),
    };
    let guard = format!("{}_H", ident.to_uppercase());

    let mut chunk_size = opts.chunk_size - opts.chunk_size % word_bytes;
    if chunk_size != opts.chunk_size || chunk_size == 0 {
        println!("Warning: Chunk size truncated to full words length");
        chunk_size = chunk_size.max(word_bytes);
    }

    println!("File size: {size} bytes");
    println!("Chunk size: {chunk_size} bytes");
    if opts.offset > 0 {
        println!("Start from position: {}", opts.offset);
    }
    if opts.length > 0 {
        println!("Process maximum {} bytes", opts.length);
    }
    if opts.word_width != WordWidth::Byte {
        println!("Pack into {} bit ints", opts.word_width.bits());
        if opts.swap {
            println!("Swap endianess");
        }
    }

    let mut window = size - opts.offset;
    if opts.length > 0 && opts.length < window {
        window = opts.length;
    }

    let omit = window % word_bytes as u64;
    if omit > 0 {
        println!("Warning: Last {omit} byte(s) will be ignored as not forming full data word");
        window -= omit;
    }

    let total_words = window / word_bytes as u64;
    let chunk_count = window.div_ceil(chunk_size as u64);

    let mut source = File::open(&opts.source)?;
    source.seek(SeekFrom::Start(opts.offset))?;
    let mut reader = source.take(window);

    let mut enc = Encoder::new(BufWriter::new(File::create(&output)?), opts, total_words);
    enc.prologue(&ident, &guard)?;

    let mut buffer = vec![0; chunk_size];
    let mut bytes_read = 0;
    let mut status = Status::Completed;

    'stream: for chunk_idx in 0..chunk_count {
        if cancel.is_cancelled() {
            status = Status::Cancelled;
            break;
        }

        print!("\rWriting chunk {} out of {chunk_count} (Ctrl+C to cancel)", chunk_idx + 1);
        io::stdout().flush()?;

        let filled = read_chunk(&mut reader, &mut buffer)?;
        if filled == 0 {
            break;
        }
        bytes_read += filled as u64;

        for group in buffer[..filled].chunks_exact(word_bytes) {
            if cancel.is_cancelled() {
                status = Status::Cancelled;
                break 'stream;
            }

            enc.push_word(group)?;
        }
    }

    if chunk_count > 0 {
        println!();
    }
    if status == Status::Cancelled {
        println!("Cancelled");
    }

    // release the source before the closing stanza, as the historical tool did
    drop(reader);

    enc.finish()?;
    enc.epilogue(&ident, &guard)?;

    Ok(Report {
        status,
        bytes_read,
        bytes_written: enc.bytes_written(),
        elapsed: timer.elapsed(),
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the formatter over an in-memory buffer.
    fn render(data: &[u8], opts: &Options) -> String {
        let total = (data.len() / opts.word_width.bytes()) as u64;
        let mut out = Vec::new();

        let mut enc = Encoder::new(&mut out, opts, total);
        enc.prologue("test_bin", "TEST_BIN_H").unwrap();
        for group in data.chunks_exact(opts.word_width.bytes()) {
            enc.push_word(group).unwrap();
        }
        enc.finish().unwrap();
        enc.epilogue("test_bin", "TEST_BIN_H").unwrap();

        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_pack_word() {
        assert_eq!(pack_word(&[0x01, 0x02], false), 0x0102);
        assert_eq!(pack_word(&[0x01, 0x02], true), 0x0201);
        assert_eq!(pack_word(&[0x01, 0x02, 0x03, 0x04], false), 0x01020304);
        assert_eq!(pack_word(&[0x01, 0x02, 0x03, 0x04], true), 0x04030201);
        assert_eq!(pack_word(&[0xAB], false), 0xAB);
        assert_eq!(pack_word(&[0xAB], true), 0xAB);
    }

    #[test]
    fn test_printable() {
        assert_eq!(printable(b'a'), 'a');
        assert_eq!(printable(0x20), ' ');
        assert_eq!(printable(0x7E), '~');
        assert_eq!(printable(0x7F), '.');
        assert_eq!(printable(0x00), '.');
    }

    #[test]
    fn test_word_width_from_bits() {
        assert_eq!(WordWidth::try_from(8), Ok(WordWidth::Byte));
        assert_eq!(WordWidth::try_from(16), Ok(WordWidth::Short));
        assert_eq!(WordWidth::try_from(32), Ok(WordWidth::Int));
        assert!(WordWidth::try_from(24).is_err());
    }

    #[test]
    fn test_eol_parsing() {
        assert_eq!("lf".parse(), Ok(Eol::Lf));
        assert_eq!("cr".parse(), Ok(Eol::Cr));
        assert_eq!("crlf".parse(), Ok(Eol::CrLf));
        assert!("unix".parse::<Eol>().is_err());
    }

    #[test]
    fn test_plain_byte_header() {
        let opts = Options::new("test.bin");
        assert_eq!(
            render(&[0x41, 0x42, 0x00], &opts),
            "#ifndef TEST_BIN_H\n#define TEST_BIN_H\n\
             \nstatic const unsigned char test_bin[] = {\n\
             \t0x41, 0x42, 0x00\n\
             };\n\
             \n#endif /* TEST_BIN_H */\n"
        );
    }

    #[test]
    fn test_stdvector_stanza() {
        let mut opts = Options::new("test.bin");
        opts.stdvector = true;

        let text = render(&[0x01], &opts);
        assert!(text.contains("\n#ifdef __cplusplus\n#include <vector>\n#endif\n"));
        assert!(text.contains(
            "\n#ifdef __cplusplus\nstatic const std::vector<char> \
             test_bin_v(test_bin, test_bin + sizeof(test_bin));\n#endif\n"
        ));
    }

    #[test]
    fn test_line_wrapping() {
        let opts = Options::new("test.bin");

        // 25 bytes at 12 per line: lines of 12, 12 and 1 words
        let text = render(&[0u8; 25], &opts);
        let lines: Vec<&str> = text.lines().filter(|l| l.starts_with('\t')).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].matches("0x").count(), 12);
        assert_eq!(lines[1].matches("0x").count(), 12);
        assert_eq!(lines[2].matches("0x").count(), 1);

        // non-final lines end with a comma, the final word does not
        assert!(lines[0].ends_with(','));
        assert!(lines[2].ends_with("0x00"));
    }

    #[test]
    fn test_short_words() {
        let mut opts = Options::new("test.bin");
        opts.word_width = WordWidth::Short;

        assert!(render(&[0x01, 0x02], &opts).contains("\t0x0102\n"));

        opts.swap = true;
        assert!(render(&[0x01, 0x02], &opts).contains("\t0x0201\n"));
    }

    #[test]
    fn test_int_words() {
        let mut opts = Options::new("test.bin");
        opts.word_width = WordWidth::Int;

        assert!(render(&[0x01, 0x02, 0x03, 0x04], &opts).contains("\t0x01020304\n"));

        opts.swap = true;
        assert!(render(&[0x01, 0x02, 0x03, 0x04], &opts).contains("\t0x04030201\n"));
    }

    #[test]
    fn test_content_comments() {
        let mut opts = Options::new("test.bin");
        opts.content = true;
        opts.bytes_per_line = 2;

        let text = render(&[0x48, 0x69, 0x21, 0x01], &opts);
        assert!(text.contains("\t0x48, 0x69, /* Hi */\n"));
        assert!(text.contains("\t0x21, 0x01  /* !. */\n"));
    }

    #[test]
    fn test_content_comment_alignment() {
        let mut opts = Options::new("test.bin");
        opts.content = true;
        opts.bytes_per_line = 4;

        // final line one word short: padded by one word width ("0xHH, ")
        let text = render(&[b'a', b'b', b'c', b'd', b'e', b'f', b'g'], &opts);
        assert!(text.contains("\t0x61, 0x62, 0x63, 0x64, /* abcd */\n"));
        assert!(text.contains("\t0x65, 0x66, 0x67        /* efg */\n"));
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut opts = Options::new("test.bin");
        opts.eol = Eol::CrLf;

        let text = render(&[0x01, 0x02], &opts);
        assert!(text.starts_with("#ifndef TEST_BIN_H\r\n#define TEST_BIN_H\r\n"));
        assert!(text.contains("\t0x01, 0x02\r\n};\r\n"));
        assert!(text.ends_with("#endif /* TEST_BIN_H */\r\n"));
    }

    #[test]
    fn test_empty_payload() {
        let opts = Options::new("test.bin");
        assert_eq!(
            render(&[], &opts),
            "#ifndef TEST_BIN_H\n#define TEST_BIN_H\n\
             \nstatic const unsigned char test_bin[] = {\n\
             };\n\
             \n#endif /* TEST_BIN_H */\n"
        );
    }

    #[test]
    fn test_cancelled_line_is_terminated() {
        let opts = Options::new("test.bin");
        let mut out = Vec::new();

        // pretend the run was cancelled after 3 of 24 words
        let mut enc = Encoder::new(&mut out, &opts, 24);
        enc.prologue("test_bin", "TEST_BIN_H").unwrap();
        for group in [[0x01], [0x02], [0x03]] {
            enc.push_word(&group).unwrap();
        }
        enc.finish().unwrap();
        enc.epilogue("test_bin", "TEST_BIN_H").unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\t0x01, 0x02, 0x03\n};\n"));
        assert!(text.ends_with("#endif /* TEST_BIN_H */\n"));
    }
}
