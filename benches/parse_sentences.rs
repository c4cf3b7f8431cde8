use criterion::{Criterion, black_box, criterion_group, criterion_main};

use sparsecky::config::{DecodeMethod, ParserConfig, ReparseStrategy};
use sparsecky::grammar::SparseGrammar;
use sparsecky::inside_outside::InsideOutsideParser;

const REPORT_SRC: &str = include_str!("../grammars/report.gr");
const FISH_SRC: &str = include_str!("../grammars/fish.gr");

fn criterion_benchmark(c: &mut Criterion) {
  let report = REPORT_SRC.parse::<SparseGrammar>().unwrap();
  let fish = FISH_SRC.parse::<SparseGrammar>().unwrap();
  let sentence = "The report is due out tomorrow ."
    .split(' ')
    .collect::<Vec<_>>();

  for method in DecodeMethod::ALL {
    let parser = InsideOutsideParser::new(&report, ParserConfig::with_decode_method(method)).unwrap();
    let mut ctx = parser.new_context();
    c.bench_function(&format!("parse report {}", method), |b| {
      b.iter(|| parser.parse(&mut ctx, black_box(&sentence)))
    });
  }

  // long enough that the inside pass has to rescale
  let mut long = vec!["The"; 200];
  long.extend(["fish", "market"]);
  let config = ParserConfig {
    reparse: ReparseStrategy::None,
    ..Default::default()
  };
  let parser = InsideOutsideParser::new(&fish, config).unwrap();
  let mut ctx = parser.new_context();
  c.bench_function("parse 202 words", |b| {
    b.iter(|| parser.parse(&mut ctx, black_box(&long)))
  });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
