use std::env;
use std::io;
use std::io::{BufRead, Write};
use std::process;
use std::str::FromStr;
use std::thread;

use tracing::info;
use tracing_subscriber::EnvFilter;

use sparsecky::{Err, InsideOutsideParser, ParseContext, ParserConfig, SparseGrammar};

fn usage(prog_name: &str) -> String {
  format!(
    r"Usage: {} GRAMMAR [options] < sentences

Reads one whitespace-tokenized sentence per line and prints one tree per line.

Options:
  -h, --help           Print this message
  -d, --decode NAME    Decoder: viterbi, goodman, split-sum or max-rule (defaults to viterbi)
  -b, --beam N         Beam width for cells over more than one word (defaults to 30)
  -l, --lambda X       Goodman/split-sum penalty per constituent (defaults to 0)
  -r, --reparse NAME   Reparse strategy: none, double, fixed-beam, exhaustive or escalate
  -t, --threads N      Parse this many sentences at once (defaults to 1)
  -c, --chart          Print each parse chart to stderr (defaults to not printing)",
    prog_name
  )
}

struct Args {
  filename: String,
  config: ParserConfig,
  threads: usize,
  print_chart: bool,
}

impl Args {
  fn make_error_message(msg: &str, prog_name: impl AsRef<str>) -> String {
    format!("argument error: {}.\n\n{}", msg, usage(prog_name.as_ref()))
  }

  fn value<T: FromStr>(flag: &str, value: Option<String>, prog_name: &str) -> Result<T, String> {
    let value = value.ok_or_else(|| Self::make_error_message(&format!("{} needs a value", flag), prog_name))?;
    value
      .parse()
      .map_err(|_| Self::make_error_message(&format!("bad value `{}` for {}", value, flag), prog_name))
  }

  fn parse(v: Vec<String>) -> Result<Self, String> {
    if v.is_empty() {
      return Err(Self::make_error_message("bad argument vector", "sparsecky"));
    }

    let args_len = v.len();
    let mut iter = v.into_iter();
    let prog_name = iter.next().unwrap_or_default();

    if args_len < 2 {
      return Err(Self::make_error_message("not enough arguments", prog_name));
    }

    let mut filename: Option<String> = None;
    let mut config = ParserConfig::default();
    let mut threads = 1;
    let mut print_chart = false;

    while let Some(o) = iter.next() {
      match o.as_str() {
        "-h" | "--help" => {
          println!("{}", usage(&prog_name));
          process::exit(0);
        }
        "-d" | "--decode" => config.decode_method = Self::value(&o, iter.next(), &prog_name)?,
        "-b" | "--beam" => config.beam_width = Self::value(&o, iter.next(), &prog_name)?,
        "-l" | "--lambda" => config.maxc_lambda = Self::value(&o, iter.next(), &prog_name)?,
        "-r" | "--reparse" => config.reparse = Self::value(&o, iter.next(), &prog_name)?,
        "-t" | "--threads" => threads = Self::value(&o, iter.next(), &prog_name)?,
        "-c" | "--chart" => print_chart = true,
        _ if filename.is_none() && !o.starts_with('-') => filename = Some(o),
        _ => return Err(Self::make_error_message("invalid arguments", prog_name)),
      }
    }

    if threads == 0 {
      return Err(Self::make_error_message("--threads must be at least 1", prog_name));
    }

    if let Some(filename) = filename {
      Ok(Self {
        filename,
        config,
        threads,
        print_chart,
      })
    } else {
      Err(Self::make_error_message("missing filename", prog_name))
    }
  }
}

/// The tree for one line, and the chart if asked for
fn parse_line(
  parser: &InsideOutsideParser<'_>,
  ctx: &mut ParseContext,
  line: &str,
  print_chart: bool,
) -> (String, Option<String>) {
  let tokens = line.split_whitespace().collect::<Vec<_>>();
  let outcome = parser.parse(ctx, &tokens);
  let chart = print_chart.then(|| ctx.chart().display(parser.grammar()).to_string());
  (outcome.to_string(), chart)
}

fn print(tree: &str, chart: Option<&str>) -> Result<(), Err> {
  if let Some(chart) = chart {
    eprintln!("chart:\n{}", chart);
  }
  let mut stdout = io::stdout().lock();
  writeln!(stdout, "{}", tree)?;
  stdout.flush()?;
  Ok(())
}

/// Splits `lines` into one run of consecutive sentences per thread and keeps their order
fn parse_parallel(
  parser: &InsideOutsideParser<'_>,
  lines: &[String],
  threads: usize,
  print_chart: bool,
) -> Result<Vec<(String, Option<String>)>, Err> {
  let chunk_size = lines.len().div_ceil(threads).max(1);
  thread::scope(|scope| {
    let handles = lines
      .chunks(chunk_size)
      .map(|chunk| {
        scope.spawn(move || {
          let mut ctx = parser.new_context();
          chunk
            .iter()
            .map(|line| parse_line(parser, &mut ctx, line, print_chart))
            .collect::<Vec<_>>()
        })
      })
      .collect::<Vec<_>>();

    let mut results = Vec::with_capacity(lines.len());
    for handle in handles {
      results.extend(handle.join().map_err(|_| "parser thread panicked")?);
    }
    Ok(results)
  })
}

fn main() -> Result<(), Err> {
  let opts = match Args::parse(env::args().collect()) {
    Ok(opts) => opts,
    Err(msg) => {
      eprintln!("{}", msg);
      process::exit(255);
    }
  };

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let g = SparseGrammar::read_from_file(&opts.filename)?;
  let parser = InsideOutsideParser::new(&g, opts.config)?;
  info!(decoder = %parser.config().decode_method, threads = opts.threads, "ready");

  let stdin = io::stdin();
  if opts.threads == 1 {
    let mut ctx = parser.new_context();
    for line in stdin.lock().lines() {
      let (tree, chart) = parse_line(&parser, &mut ctx, &line?, opts.print_chart);
      print(&tree, chart.as_deref())?;
    }
    return Ok(());
  }

  let lines = stdin.lock().lines().collect::<Result<Vec<_>, _>>()?;
  for (tree, chart) in parse_parallel(&parser, &lines, opts.threads, opts.print_chart)? {
    print(&tree, chart.as_deref())?;
  }
  info!(sentences = lines.len(), "done");
  Ok(())
}
