//! Concurrent source line counter.
//!
//! Walks a directory tree, classifies every recognized source file's lines
//! into code, comment, and blank, and prints a per-language totals table.
//!
//! Supported languages: Go, Rust, Java, Python, C, C++, Javascript,
//! Typescript, HTML, JSON, Protobuf, Markdown, Shell, YAML.

use clap::{ArgAction, Parser};
use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use colored::*;
use crossbeam_channel::{bounded, Receiver, Sender};
use glob::Pattern;

// Width of one `━` border line: six columns plus separators.
const BORDER_LEN: usize = 67;

// Capacity of the path queue between directory discovery and the workers.
const WORK_QUEUE_DEPTH: usize = 100;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Concurrent source line counter for multiple programming languages",
    long_about = "Counts code, comment, and blank lines per language across a directory tree. Supported languages: Go, Rust, Java, Python, C, C++, Javascript, Typescript, HTML, JSON, Protobuf, Markdown, Shell, YAML."
)]
struct Args {
    #[arg(default_value = ".")]
    path: String,

    /// Directory names to skip during the walk.
    #[arg(short, long, action = ArgAction::Append)]
    ignore: Vec<String>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long, default_value = "1000000")]
    max_entries: usize,

    #[arg(short = 'd', long, default_value = "100")]
    max_depth: usize,

    /// Worker thread count; 0 means twice the available CPUs.
    #[arg(short = 'w', long, default_value = "0")]
    workers: usize,

    #[arg(short = 'f', long)]
    filespec: Option<String>,
}

/// Stable identifier of a registered language; doubles as the report
/// tie-break key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct LanguageId(u32);

/// Immutable description of one language: how to spot its comments and
/// which file extensions select it.
#[derive(Debug, Clone)]
struct LanguageSpec {
    id: LanguageId,
    name: &'static str,
    line_comment: &'static str,
    block_comment: Option<(&'static str, &'static str)>,
    extensions: &'static [&'static str],
}

const BUILTIN_LANGUAGES: &[LanguageSpec] = &[
    LanguageSpec {
        id: LanguageId(1),
        name: "Go",
        line_comment: "//",
        block_comment: Some(("/*", "*/")),
        extensions: &[".go"],
    },
    LanguageSpec {
        id: LanguageId(2),
        name: "Rust",
        line_comment: "//",
        block_comment: None,
        extensions: &[".rs"],
    },
    LanguageSpec {
        id: LanguageId(3),
        name: "Java",
        line_comment: "//",
        block_comment: None,
        extensions: &[".java"],
    },
    LanguageSpec {
        id: LanguageId(4),
        name: "Python",
        line_comment: "#",
        block_comment: None,
        extensions: &[".py"],
    },
    LanguageSpec {
        id: LanguageId(5),
        name: "C",
        line_comment: "//",
        block_comment: None,
        extensions: &[".c", ".h"],
    },
    LanguageSpec {
        id: LanguageId(6),
        name: "C++",
        line_comment: "//",
        block_comment: None,
        extensions: &[".cpp", ".hpp"],
    },
    LanguageSpec {
        id: LanguageId(7),
        name: "Javascript",
        line_comment: "//",
        block_comment: None,
        extensions: &[".js"],
    },
    LanguageSpec {
        id: LanguageId(8),
        name: "Typescript",
        line_comment: "//",
        block_comment: None,
        extensions: &[".ts"],
    },
    LanguageSpec {
        id: LanguageId(9),
        name: "HTML",
        line_comment: "//",
        block_comment: None,
        extensions: &[".html", ".htm"],
    },
    LanguageSpec {
        id: LanguageId(10),
        name: "JSON",
        line_comment: "//",
        block_comment: None,
        extensions: &[".json"],
    },
    LanguageSpec {
        id: LanguageId(11),
        name: "Protobuf",
        line_comment: "//",
        block_comment: None,
        extensions: &[".proto"],
    },
    LanguageSpec {
        id: LanguageId(12),
        name: "Markdown",
        line_comment: "//",
        block_comment: None,
        extensions: &[".md"],
    },
    LanguageSpec {
        id: LanguageId(13),
        name: "Shell",
        line_comment: "#",
        block_comment: None,
        extensions: &[".sh"],
    },
    LanguageSpec {
        id: LanguageId(14),
        name: "YAML",
        line_comment: "#",
        block_comment: None,
        extensions: &[".yaml", ".yml"],
    },
];

/// Maps file extensions to language descriptors. Built once per run and
/// read-only afterwards.
#[derive(Debug, Default)]
struct LanguageRegistry {
    languages: Vec<LanguageSpec>,
    by_extension: HashMap<&'static str, usize>,
}

impl LanguageRegistry {
    fn with_builtin_languages() -> Self {
        let mut registry = LanguageRegistry::default();
        for spec in BUILTIN_LANGUAGES {
            registry.register(spec.clone());
        }
        registry
    }

    fn register(&mut self, spec: LanguageSpec) {
        let index = self.languages.len();
        for ext in spec.extensions {
            self.by_extension.insert(ext, index);
        }
        self.languages.push(spec);
    }

    /// Exact-match lookup; the key carries the leading dot and is
    /// case-sensitive.
    fn resolve(&self, extension: &str) -> Option<&LanguageSpec> {
        self.by_extension
            .get(extension)
            .map(|&index| &self.languages[index])
    }

    fn resolve_path(&self, path: &Path) -> Option<&LanguageSpec> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        self.resolve(&format!(".{}", ext))
    }

    fn descriptor(&self, id: LanguageId) -> Option<&LanguageSpec> {
        self.languages.iter().find(|spec| spec.id == id)
    }
}

/// Per-file (or per-aggregate) line counts. Field-wise addition is
/// commutative and associative with the all-zero value as identity, which
/// is what makes merging from many workers order-independent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Item {
    files: u64,
    lines: u64,
    code: u64,
    blank: u64,
    comment: u64,
}

fn merge_items(a: Item, b: Item) -> Item {
    Item {
        files: a.files + b.files,
        lines: a.lines + b.lines,
        code: a.code + b.code,
        blank: a.blank + b.blank,
        comment: a.comment + b.comment,
    }
}

/// Reads a file's content line by line, replacing invalid UTF-8 sequences
/// with the replacement character.
struct LossyLineReader {
    reader: BufReader<Box<dyn Read + Send>>,
    buffer: Vec<u8>,
}

impl LossyLineReader {
    fn new(file: fs::File) -> Self {
        Self::from_reader(Box::new(file))
    }

    fn from_reader(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: Vec::with_capacity(8 * 1024),
        }
    }

    #[cfg(test)]
    fn with_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self::from_reader(Box::new(reader))
    }
}

impl Iterator for LossyLineReader {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.clear();
        match self.reader.read_until(b'\n', &mut self.buffer) {
            Ok(0) => None,
            Ok(_) => {
                let text = String::from_utf8_lossy(&self.buffer);
                let line = text.trim_end_matches(['\n', '\r']).to_string();
                Some(Ok(line))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// A control byte other than tab/LF/CR marks the whole file as binary.
fn is_binary_line(line: &str) -> bool {
    line.bytes()
        .any(|b| b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r')
}

/// Classifies one file into an `Item` with `files = 1`.
///
/// Returns `Ok(None)` when binary content is detected; the file is then
/// excluded as if its extension were unknown, and no partial counts leak
/// out. Classification looks only at the leading token of each trimmed
/// line, so a comment marker at the start of a string-literal line is
/// counted as a comment.
fn classify_file(path: &Path, spec: &LanguageSpec) -> io::Result<Option<Item>> {
    let file = fs::File::open(path)?;
    classify_lines(LossyLineReader::new(file), spec)
}

fn classify_lines(lines: LossyLineReader, spec: &LanguageSpec) -> io::Result<Option<Item>> {
    let mut item = Item {
        files: 1,
        ..Item::default()
    };
    let mut in_block = false;

    for line_result in lines {
        let line = line_result?;
        if is_binary_line(&line) {
            return Ok(None);
        }
        item.lines += 1;
        let trimmed = line.trim();

        // Every line inside an open block is a comment line, blank or not.
        if in_block {
            item.comment += 1;
            if let Some((_, close)) = spec.block_comment {
                if trimmed.contains(close) {
                    in_block = false;
                }
            }
            continue;
        }
        if trimmed.is_empty() {
            item.blank += 1;
            continue;
        }
        if trimmed.starts_with(spec.line_comment) {
            item.comment += 1;
            continue;
        }
        if let Some((open, close)) = spec.block_comment {
            if trimmed.starts_with(open) {
                item.comment += 1;
                // The close token only counts past the open token; `/*/`
                // still opens a block.
                if !trimmed[open.len()..].contains(close) {
                    in_block = true;
                }
                continue;
            }
        }
        item.code += 1;
    }

    // EOF with the block still open is fine; trailing lines stay comments.
    Ok(Some(item))
}

/// Per-language totals shared by all workers. Writes go through `add`;
/// reads happen only after every worker has joined.
#[derive(Debug, Default)]
struct Aggregate {
    table: Mutex<HashMap<LanguageId, Item>>,
}

impl Aggregate {
    fn add(&self, lang: LanguageId, item: Item) {
        let mut table = self
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = table.entry(lang).or_default();
        *entry = merge_items(*entry, item);
    }

    fn snapshot(&self) -> HashMap<LanguageId, Item> {
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

// Scan counters, updated by the workers.
#[derive(Debug)]
struct ScanMetrics {
    files_processed: AtomicU64,
    lines_processed: AtomicU64,
    start_time: Instant,
}

impl ScanMetrics {
    fn new() -> Self {
        ScanMetrics {
            files_processed: AtomicU64::new(0),
            lines_processed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    fn record_file(&self, lines: u64) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.lines_processed.fetch_add(lines, Ordering::Relaxed);
    }

    fn print_summary(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let files = self.files_processed.load(Ordering::Relaxed);
        let lines = self.lines_processed.load(Ordering::Relaxed);

        eprintln!("\n{}", "Scan Summary:".blue().bold());
        eprintln!(
            "Total time: {} seconds",
            format!("{:.2}", elapsed).bright_yellow()
        );
        eprintln!(
            "Files processed: {} ({})",
            files.to_string().bright_yellow(),
            format!("{:.1} files/sec", safe_rate(files, elapsed)).bright_yellow()
        );
        eprintln!(
            "Lines processed: {} ({})",
            lines.to_string().bright_yellow(),
            format!("{:.1} lines/sec", safe_rate(lines, elapsed)).bright_yellow()
        );
    }
}

fn safe_rate(value: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= f64::EPSILON {
        0.0
    } else {
        value as f64 / elapsed_secs
    }
}

/// Run-scoped state shared between the directory walk and the workers.
/// One instance exists per run; nothing here is global.
struct RunContext {
    registry: LanguageRegistry,
    aggregate: Aggregate,
    warnings: Mutex<Vec<(PathBuf, io::Error)>>,
    metrics: ScanMetrics,
    cancelled: AtomicBool,
    entries_seen: AtomicUsize,
    max_entries: usize,
}

impl RunContext {
    fn new(registry: LanguageRegistry, max_entries: usize) -> Self {
        RunContext {
            registry,
            aggregate: Aggregate::default(),
            warnings: Mutex::new(Vec::new()),
            metrics: ScanMetrics::new(),
            cancelled: AtomicBool::new(false),
            entries_seen: AtomicUsize::new(0),
            max_entries,
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Counts one discovered file against the entry budget. Returns false
    /// once the budget is exhausted.
    fn claim_entry(&self) -> bool {
        self.entries_seen.fetch_add(1, Ordering::SeqCst) < self.max_entries
    }

    fn warn(&self, path: PathBuf, err: io::Error) {
        self.warnings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((path, err));
    }
}

fn is_ignored_dir(path: &Path) -> bool {
    let dir_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ignored = [
        "target",
        "node_modules",
        "build",
        "dist",
        ".git",
        "venv",
        "__pycache__",
        "bin",
        "obj",
    ];
    ignored.contains(&dir_name)
}

fn should_process_file(filespec: Option<&Pattern>, root_path: &Path, file_path: &Path) -> bool {
    filespec
        .map(|pattern| filespec_matches(pattern, root_path, file_path))
        .unwrap_or(true)
}

fn filespec_matches(pattern: &Pattern, root_path: &Path, file_path: &Path) -> bool {
    if file_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| pattern.matches(name))
        .unwrap_or(false)
    {
        return true;
    }

    let relative = match file_path.strip_prefix(root_path) {
        Ok(rel) => rel,
        Err(_) => return false,
    };

    let rel_str = match relative.to_str() {
        Some(s) => s.replace('\\', "/"),
        None => return false,
    };

    pattern.matches(&rel_str)
}

/// Recursive directory discovery; the producer side of the work queue.
///
/// Per-entry failures become warnings and the walk continues. The only
/// fatal condition is the entry budget: exceeding it raises the run's
/// cancellation flag and unwinds with an error.
fn scan_tree(
    ctx: &RunContext,
    path: &Path,
    args: &Args,
    root_path: &Path,
    filespec: Option<&Pattern>,
    depth: usize,
    tx: &Sender<PathBuf>,
) -> io::Result<()> {
    if depth > args.max_depth {
        ctx.warn(
            path.to_path_buf(),
            io::Error::other(format!(
                "maximum directory depth ({}) reached",
                args.max_depth
            )),
        );
        return Ok(());
    }

    if is_ignored_dir(path) || args.ignore.iter().any(|d| path.ends_with(Path::new(d))) {
        return Ok(());
    }

    let metadata = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) => {
            ctx.warn(path.to_path_buf(), err);
            return Ok(());
        }
    };

    if metadata.is_file() {
        return enqueue_file(ctx, path, root_path, filespec, tx);
    }
    if !metadata.is_dir() {
        return Ok(());
    }

    let read_dir = match fs::read_dir(path) {
        Ok(iter) => iter,
        Err(err) => {
            ctx.warn(path.to_path_buf(), err);
            return Ok(());
        }
    };

    for entry_result in read_dir {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                ctx.warn(path.to_path_buf(), err);
                continue;
            }
        };

        let entry_path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(err) => {
                ctx.warn(entry_path, err);
                continue;
            }
        };

        if file_type.is_dir() && !file_type.is_symlink() {
            scan_tree(ctx, &entry_path, args, root_path, filespec, depth + 1, tx)?;
        } else if file_type.is_file() && !file_type.is_symlink() {
            enqueue_file(ctx, &entry_path, root_path, filespec, tx)?;
        }
    }

    Ok(())
}

fn enqueue_file(
    ctx: &RunContext,
    path: &Path,
    root_path: &Path,
    filespec: Option<&Pattern>,
    tx: &Sender<PathBuf>,
) -> io::Result<()> {
    if !should_process_file(filespec, root_path, path) {
        return Ok(());
    }

    if !ctx.claim_entry() {
        ctx.cancel();
        return Err(io::Error::other("Too many entries in directory tree"));
    }

    // Send only fails when every worker is already gone.
    let _ = tx.send(path.to_path_buf());
    Ok(())
}

/// One worker: take paths until the queue closes. After cancellation the
/// queue is drained without processing so the producer never blocks on a
/// full channel.
fn worker_loop(ctx: &RunContext, rx: &Receiver<PathBuf>, verbose: bool) {
    for path in rx {
        if ctx.is_cancelled() {
            continue;
        }
        process_file(ctx, &path, verbose);
    }
}

fn process_file(ctx: &RunContext, path: &Path, verbose: bool) {
    let Some(spec) = ctx.registry.resolve_path(path) else {
        // Unknown extension: expected, silent skip.
        return;
    };

    match classify_file(path, spec) {
        Ok(Some(item)) => {
            ctx.metrics.record_file(item.lines);
            if verbose {
                // Workers share stderr; emit one write per file.
                eprintln!(
                    "File: {}\n  Lines: {}\n  Code: {}\n  Comments: {}\n  Blanks: {}",
                    path.display(),
                    item.lines,
                    item.code,
                    item.comment,
                    item.blank
                );
            }
            ctx.aggregate.add(spec.id, item);
        }
        Ok(None) => {} // binary content, excluded
        Err(err) => ctx.warn(path.to_path_buf(), err),
    }
}

/// Spawns the worker pool, feeds it from the directory walk, and joins
/// every worker before returning. Past this call the aggregate no longer
/// changes.
fn run_scan(
    ctx: &RunContext,
    args: &Args,
    root_path: &Path,
    filespec: Option<&Pattern>,
    workers: usize,
) -> io::Result<()> {
    let (tx, rx) = bounded::<PathBuf>(WORK_QUEUE_DEPTH);

    thread::scope(|scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            scope.spawn(move || worker_loop(ctx, &rx, args.verbose));
        }
        drop(rx);

        let walk_result = scan_tree(ctx, root_path, args, root_path, filespec, 0, &tx);
        // Closing the queue lets the workers finish draining and exit.
        drop(tx);
        walk_result
    })
}

fn format_report_row(name: &str, item: &Item) -> String {
    format!(
        " {:<10} {:>10} {:>10} {:>10} {:>10} {:>10} ",
        name, item.files, item.lines, item.code, item.comment, item.blank
    )
}

/// Renders the finished table: languages sorted by total lines descending,
/// language id breaking ties so repeated runs agree, plus a Total row.
fn render_report(registry: &LanguageRegistry, table: &HashMap<LanguageId, Item>) -> String {
    let mut rows: Vec<(LanguageId, Item)> = table
        .iter()
        .filter(|(_, item)| item.files > 0)
        .map(|(&id, &item)| (id, item))
        .collect();
    rows.sort_by(|(a_id, a), (b_id, b)| b.lines.cmp(&a.lines).then(a_id.cmp(b_id)));

    let border = "━".repeat(BORDER_LEN);
    let mut output = String::new();
    let _ = writeln!(output, "{}", border);
    let _ = writeln!(
        output,
        " {:<10} {:>10} {:>10} {:>10} {:>10} {:>10} ",
        "Language", "Files", "Lines", "Code", "Comments", "Blanks"
    );
    let _ = writeln!(output, "{}", border);

    let mut total = Item::default();
    for (id, item) in &rows {
        total = merge_items(total, *item);
        let name = registry
            .descriptor(*id)
            .map(|spec| spec.name)
            .unwrap_or("?");
        let _ = writeln!(output, "{}", format_report_row(name, item));
    }

    let _ = writeln!(output, "{}", border);
    let _ = writeln!(output, "{}", format_report_row("Total", &total));
    let _ = writeln!(output, "{}", border);

    output
}

fn report_warnings(ctx: &RunContext) {
    let mut warnings = ctx
        .warnings
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if warnings.is_empty() {
        return;
    }
    // Workers finish in arbitrary order; report in path order.
    warnings.sort_by(|(a, _), (b, _)| a.cmp(b));

    eprintln!(
        "{}: {} path(s) skipped during scan",
        "Warning".red().bold(),
        warnings.len()
    );
    for (path, err) in warnings.iter() {
        eprintln!("  {}: {}", path.display(), err);
    }
}

fn main() -> io::Result<()> {
    run_with_args(env::args_os())
}

fn run_with_args<I, T>(args: I) -> io::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = Args::parse_from(args);
    run_cli(args)
}

fn run_cli(args: Args) -> io::Result<()> {
    let path = Path::new(&args.path);
    if !path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Path does not exist: {}", path.display()),
        ));
    }

    let filespec = match args.filespec.as_deref() {
        Some(spec) => Some(Pattern::new(spec).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid filespec pattern '{}': {}", spec, err),
            )
        })?),
        None => None,
    };

    let workers = if args.workers == 0 {
        num_cpus::get() * 2
    } else {
        args.workers
    };
    let root_path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

    let ctx = RunContext::new(LanguageRegistry::with_builtin_languages(), args.max_entries);
    let scan_result = run_scan(&ctx, &args, &root_path, filespec.as_ref(), workers);

    report_warnings(&ctx);
    if args.verbose {
        ctx.metrics.print_summary();
    }

    // A cancelled run prints no table; the error carries the cause.
    scan_result?;

    print!("{}", render_report(&ctx.registry, &ctx.aggregate.snapshot()));
    Ok(())
}
