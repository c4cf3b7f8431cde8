use std::thread;

use sparsecky::config::{DecodeMethod, ParserConfig, ReparseStrategy};
use sparsecky::grammar::SparseGrammar;
use sparsecky::inside_outside::{InsideOutsideParser, ParseOutcome};
use sparsecky::reparse::ReparseStage;
use sparsecky::semiring::Log;

macro_rules! grammar_file {
  ($name:literal) => {
    include_str!(concat!("../grammars/", $name))
      .parse::<SparseGrammar>()
      .unwrap()
  };
}

const REPORT: &str = "The report is due out tomorrow .";
const REPORT_TREE: &str =
  "(ROOT (S (NP (DT The) (NN report)) (VP (VBZ is) (ADJP (JJ due) (PP (IN out) (NP (NN tomorrow))))) (. .)))";

#[test]
fn test_every_decoder_agrees_on_report() {
  let g = grammar_file!("report.gr");
  for method in DecodeMethod::ALL {
    let config = ParserConfig::with_decode_method(method);

    let real = InsideOutsideParser::new(&g, config.clone()).unwrap().parse_sentence(REPORT);
    assert_eq!(real.to_string(), REPORT_TREE, "{}", method);
    assert_eq!(real.parse().unwrap().stage, ReparseStage::Normal);

    let log = InsideOutsideParser::<Log>::with_semiring(&g, config)
      .unwrap()
      .parse_sentence(REPORT);
    assert_eq!(log.to_string(), REPORT_TREE, "{} (log domain)", method);
  }
}

#[test]
fn test_goodman_lambda_on_fish() {
  let g = grammar_file!("fish.gr");
  let parse = |lambda: f64| {
    let config = ParserConfig {
      maxc_lambda: lambda,
      ..ParserConfig::with_decode_method(DecodeMethod::Goodman)
    };
    InsideOutsideParser::new(&g, config)
      .unwrap()
      .parse_sentence("The fish market stands last")
      .to_string()
  };

  assert_eq!(
    parse(0.0),
    "(ROOT (S (NP (DT The) (NP (NN fish) (NN market))) (VP (VB stands) (RB last))))"
  );
  assert_eq!(
    parse(1.0),
    "(ROOT (S (NP (DT The) (NN fish) (NN market)) (VP (VB stands) (RB last))))"
  );
}

#[test]
fn test_relaxing_the_beam_never_lowers_the_score() {
  let g = grammar_file!("report.gr");
  let score = |config: ParserConfig| {
    let outcome = InsideOutsideParser::new(&g, config).unwrap().parse_sentence(REPORT);
    outcome.parse().map(|p| (p.score, p.stage)).unwrap()
  };

  let (exhaustive, stage) = score(ParserConfig {
    beam_width: 1,
    reparse: ReparseStrategy::Exhaustive,
    ..Default::default()
  });
  assert_eq!(stage, ReparseStage::Exhaustive);

  for beam_width in [2, 4, 30] {
    let config = ParserConfig {
      beam_width,
      reparse: ReparseStrategy::None,
      ..Default::default()
    };
    if let ParseOutcome::Parsed(parse) = InsideOutsideParser::new(&g, config).unwrap().parse_sentence(REPORT) {
      assert!(exhaustive >= parse.score - 1e-9, "width {}", beam_width);
    }
  }
  let (normal, _) = score(ParserConfig::default());
  assert!(exhaustive >= normal - 1e-9);
}

#[test]
fn test_max_rule_never_stacks_unaries() {
  let g = grammar_file!("report.gr");
  for product in [true, false] {
    let config = ParserConfig {
      max_rule_product: product,
      ..ParserConfig::with_decode_method(DecodeMethod::MaxRuleProd)
    };
    let parser = InsideOutsideParser::new(&g, config).unwrap();
    let mut ctx = parser.new_context();
    for sentence in [REPORT, "The report is due .", "The report is due out report ."] {
      let tokens: Vec<&str> = sentence.split_whitespace().collect();
      let outcome = parser.parse(&mut ctx, &tokens);
      let tree = outcome.tree().unwrap();
      assert!(!tree.has_consecutive_unaries(), "{}", tree);
      let leaves: Vec<&str> = tree.leaves().into_iter().map(|l| l.as_str()).collect();
      assert_eq!(leaves, tokens);
    }
  }

  // S -> VP -> VB only exists once the exhaustive closure runs
  let chain = grammar_file!("chain.gr");
  let parser = InsideOutsideParser::new(&chain, ParserConfig::with_decode_method(DecodeMethod::MaxRuleProd)).unwrap();
  let outcome = parser.parse_sentence("go .");
  let parse = outcome.parse().unwrap();
  assert_eq!(parse.stage, ReparseStage::Exhaustive);
  assert!(!parse.tree.has_consecutive_unaries(), "{}", parse.tree);
}

#[test]
fn test_threads_share_one_grammar() {
  let g = grammar_file!("report.gr");
  let sentences = [REPORT, "The report is due .", "The report is due out report ."];
  let config = ParserConfig::with_decode_method(DecodeMethod::Goodman);

  let parser = InsideOutsideParser::new(&g, config.clone()).unwrap();
  let sequential: Vec<String> = sentences.iter().map(|s| parser.parse_sentence(s).to_string()).collect();

  let parallel: Vec<String> = thread::scope(|scope| {
    let handles: Vec<_> = sentences
      .iter()
      .map(|s| {
        let (g, config) = (&g, config.clone());
        scope.spawn(move || {
          InsideOutsideParser::new(g, config)
            .unwrap()
            .parse_sentence(s)
            .to_string()
        })
      })
      .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
  });

  assert_eq!(sequential, parallel);
}

#[test]
fn test_unknown_words() {
  let g: SparseGrammar = r#"
    start=ROOT
    ROOT -> S 0.0
    S -> NN VB 0.0
    ===== LEXICON =====
    NN -> fish -0.6931471806
    NN -> UNK -0.6931471806
    VB -> swims 0.0
  "#
  .parse()
  .unwrap();
  assert_eq!(
    g.parse(&["cat", "swims"]).to_string(),
    "(ROOT (S (NN cat) (VB swims)))"
  );

  // no UNK entry, so an unknown word leaves its cell empty
  let fish = grammar_file!("fish.gr");
  let outcome = fish.parse(&["The", "cat", "market", "stands", "last"]);
  assert_eq!(outcome, ParseOutcome::Failed);
  assert_eq!(outcome.to_string(), "()");
}
