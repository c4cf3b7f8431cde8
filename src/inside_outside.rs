//! Beam-pruned inside-outside parsing over the sparse grammar.
//!
//! The inside pass fills cells bottom-up, keeping a bounded number of entries
//! per cell, and the outside pass walks them top-down. When the start symbol
//! doesn't make it into the top cell the sentence is parsed again with the
//! next beam of the configured [`ReparseStrategy`](crate::config::ReparseStrategy).
//!
//! All probability arithmetic goes through a [`ProbabilitySemiring`]. Besides
//! the inside sums every entry also keeps the log score of its best derivation,
//! which ranks the beam and backs Viterbi decoding.

use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, trace};

use crate::beam::BoundedPriorityQueue;
use crate::cells::{CellSelector, NoConstraints};
use crate::chart::{Cell, Chart, ScratchCell};
use crate::config::ParserConfig;
use crate::decode::{self, Decoded};
use crate::errors::ConfigError;
use crate::fom::{FigureOfMerit, InsideFom};
use crate::grammar::SparseGrammar;
use crate::packing::{INVALID, Unpacked};
use crate::reparse::{Beam, Escalation, ReparseStage};
use crate::rules::{NonTerminal, Terminal};
use crate::semiring::{ProbabilitySemiring, Real};
use crate::syntree::{ParseTree, SynTree};

/// A tree together with how it was found
#[derive(Debug, Clone, PartialEq)]
pub struct Parse {
  pub tree: ParseTree,
  /// Log inside probability of the entry at the root of `tree`
  pub inside_ln: f64,
  /// The decoder's objective for `tree`
  pub score: f64,
  /// The beam that produced the chart
  pub stage: ReparseStage,
}

impl fmt::Display for Parse {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.tree)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
  /// The start symbol spans the sentence
  Parsed(Parse),
  /// No beam reached the start symbol. The best full-span entry, under the start symbol.
  Partial(Parse),
  /// Nothing spans the sentence
  Failed,
}

impl ParseOutcome {
  pub fn is_parsed(&self) -> bool {
    matches!(self, Self::Parsed(_))
  }

  pub fn parse(&self) -> Option<&Parse> {
    match self {
      Self::Parsed(p) | Self::Partial(p) => Some(p),
      Self::Failed => None,
    }
  }

  pub fn tree(&self) -> Option<&ParseTree> {
    self.parse().map(|p| &p.tree)
  }
}

impl fmt::Display for ParseOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.parse() {
      Some(p) => write!(f, "{}", p),
      None => write!(f, "()"),
    }
  }
}

/// Everything one parse request writes to. Keep one per thread and reuse it
/// across sentences; nothing in it outlives a call to `parse`.
pub struct ParseContext<S: ProbabilitySemiring = Real> {
  chart: Chart<S>,
  queue: BoundedPriorityQueue,
  ranked: Vec<(NonTerminal, f64)>,
  selected: Vec<NonTerminal>,
  /// `(nt, inside, viterbi)` of a cell's entries before unary closure
  snapshot: Vec<(NonTerminal, f64, f64)>,
  proposals: Vec<NonTerminal>,
  // dense |V| vectors, all zero / false between uses
  current: Vec<f64>,
  next: Vec<f64>,
  outside: Vec<f64>,
  flags: Vec<bool>,
  active: Vec<NonTerminal>,
  next_active: Vec<NonTerminal>,
}

impl<S: ProbabilitySemiring> ParseContext<S> {
  pub fn new(grammar: &SparseGrammar) -> Self {
    let num_nts = grammar.num_non_terminals();
    Self {
      chart: Chart::new(0, num_nts, 1),
      queue: BoundedPriorityQueue::new(1),
      ranked: Vec::new(),
      selected: Vec::new(),
      snapshot: Vec::new(),
      proposals: Vec::new(),
      current: vec![S::zero(); num_nts],
      next: vec![S::zero(); num_nts],
      outside: vec![S::zero(); num_nts],
      flags: vec![false; num_nts],
      active: Vec::new(),
      next_active: Vec::new(),
    }
  }

  /// The chart of the last parse
  pub fn chart(&self) -> &Chart<S> {
    &self.chart
  }
}

/// The parser. Borrows the grammar, so any number of parsers (and threads) can share one.
pub struct InsideOutsideParser<'g, S: ProbabilitySemiring = Real> {
  grammar: &'g SparseGrammar,
  config: ParserConfig,
  fom: Box<dyn FigureOfMerit>,
  _semiring: PhantomData<S>,
}

impl<'g> InsideOutsideParser<'g, Real> {
  pub fn new(grammar: &'g SparseGrammar, config: ParserConfig) -> Result<Self, ConfigError> {
    Self::with_semiring(grammar, config)
  }
}

impl<'g, S: ProbabilitySemiring> InsideOutsideParser<'g, S> {
  /// Fails on invalid settings, and on decoders the grammar can't support
  pub fn with_semiring(grammar: &'g SparseGrammar, config: ParserConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    if config.decode_method.needs_split_vocabulary() && grammar.split_vocabulary().is_none() {
      return Err(ConfigError::RequiresSplitVocabulary {
        method: config.decode_method,
      });
    }
    Ok(Self {
      grammar,
      config,
      fom: Box::new(InsideFom),
      _semiring: PhantomData,
    })
  }

  /// Replaces the figure of merit used to rank beam candidates
  pub fn with_fom(mut self, fom: impl FigureOfMerit + 'static) -> Self {
    self.fom = Box::new(fom);
    self
  }

  pub fn grammar(&self) -> &'g SparseGrammar {
    self.grammar
  }

  pub fn config(&self) -> &ParserConfig {
    &self.config
  }

  pub fn new_context(&self) -> ParseContext<S> {
    ParseContext::new(self.grammar)
  }

  /// Parses a whitespace-separated sentence in a fresh context
  pub fn parse_sentence(&self, sentence: &str) -> ParseOutcome {
    let tokens: Vec<&str> = sentence.split_whitespace().collect();
    self.parse(&mut self.new_context(), &tokens)
  }

  pub fn parse(&self, ctx: &mut ParseContext<S>, tokens: &[&str]) -> ParseOutcome {
    self.parse_constrained(ctx, tokens, &NoConstraints)
  }

  pub fn parse_constrained(
    &self,
    ctx: &mut ParseContext<S>,
    tokens: &[&str],
    selector: &dyn CellSelector,
  ) -> ParseOutcome {
    if tokens.is_empty() {
      return ParseOutcome::Failed;
    }
    let terminals: Vec<Option<Terminal>> = tokens.iter().map(|t| self.grammar.terminal_id(t)).collect();
    let n = tokens.len();
    let start_symbol = self.grammar.start_symbol();

    let mut last_stage = ReparseStage::Normal;
    for beam in Escalation::new(&self.config, self.grammar.num_non_terminals()) {
      last_stage = beam.stage;
      ctx.chart.reset(n, beam.cell_capacity());
      self.inside(ctx, &terminals, &beam, selector);

      let root_ln = ctx.chart.root_inside_ln(start_symbol);
      if !root_ln.is_finite() {
        debug!(stage = %beam.stage, words = n, entries = ctx.chart.num_entries(), "no complete parse");
        continue;
      }
      if self.config.decode_method.needs_outside() {
        self.outside(ctx, &beam, selector);
      }

      match decode::decode(self.grammar, &ctx.chart, tokens, &self.config) {
        Some(Decoded { tree, score }) => {
          debug!(stage = %beam.stage, words = n, inside = root_ln, score, "parsed");
          return ParseOutcome::Parsed(Parse {
            tree,
            inside_ln: root_ln,
            score,
            stage: beam.stage,
          });
        }
        None => debug!(stage = %beam.stage, method = %self.config.decode_method, "decoder found no tree"),
      }
    }

    self.best_effort(&ctx.chart, tokens, last_stage)
  }

  /// The Viterbi tree of the best full-span entry, put under the start symbol
  fn best_effort(&self, chart: &Chart<S>, tokens: &[&str], stage: ReparseStage) -> ParseOutcome {
    let n = tokens.len();
    let top = chart.cell(0, n);
    let Some(i) = top.best_entry() else {
      debug!(words = n, "parse failed");
      return ParseOutcome::Failed;
    };
    let Some(tree) = decode::viterbi::tree(self.grammar, chart, tokens, 0, n, top.nts[i]) else {
      return ParseOutcome::Failed;
    };

    let root = decode::output_label(self.grammar, self.grammar.start_symbol()).to_string();
    let rooted = matches!(tree.get_branch(), Some((c, _)) if c.value == root);
    let tree = if rooted {
      tree
    } else {
      SynTree::branch(root, (0, n), vec![tree])
    };
    debug!(words = n, "partial parse");
    ParseOutcome::Partial(Parse {
      tree,
      inside_ln: top.inside_ln::<S>(i),
      score: top.viterbi[i],
      stage,
    })
  }

  fn inside(&self, ctx: &mut ParseContext<S>, terminals: &[Option<Terminal>], beam: &Beam, selector: &dyn CellSelector) {
    let n = terminals.len();
    let constrained = beam.constrained && selector.has_cell_constraints();

    for (start, end) in selector.inside_order(n) {
      if constrained && !selector.is_cell_open(start, end) {
        ctx.chart.finalize_empty(start, end);
        continue;
      }
      let only_factored = constrained && selector.is_cell_only_factored(start, end);
      let unary_open = !constrained || selector.is_unary_open(start, end);

      let mut scratch = ctx.chart.open_cell(start, end);
      if end - start == 1 {
        if let Some(t) = terminals[start] {
          self.lexical(&mut scratch, t);
        }
      } else {
        self.binary(&ctx.chart, &mut scratch, only_factored);
      }

      ctx.selected.clear();
      if beam.exhaustive {
        if unary_open {
          self.unary_closure(ctx, &mut scratch);
        }
        let viterbi = &scratch.viterbi;
        ctx
          .selected
          .extend(scratch.touched().iter().filter(|&&nt| viterbi[nt as usize].is_finite()));
      } else {
        let width = match constrained.then(|| selector.beam_width(start, end)).flatten() {
          Some(w) => w,
          None if end - start == 1 => beam.lexical_row_beam_width,
          None => beam.beam_width,
        };
        let width = width.clamp(1, ctx.chart.capacity());
        self.prune(ctx, &mut scratch, width, beam, unary_open);
      }

      trace!(start, end, entries = ctx.selected.len(), "cell");
      let mut selected = std::mem::take(&mut ctx.selected);
      ctx.chart.finalize_cell(scratch, &mut selected);
      ctx.selected = selected;
    }
  }

  fn lexical(&self, scratch: &mut ScratchCell<S>, terminal: Terminal) {
    let packed = self.grammar.packing().pack_lexical(terminal);
    let end = scratch.end as u32;
    for (parent, prob, log_prob) in self.grammar.lexical_parents(terminal).iter() {
      scratch.add_inside(parent, S::weight(prob, log_prob));
      scratch.relax(parent, log_prob, packed, end);
    }
  }

  /// Every binary derivation over every midpoint, summed into `scratch`
  fn binary(&self, chart: &Chart<S>, scratch: &mut ScratchCell<S>, only_factored: bool) {
    let (start, end) = (scratch.start, scratch.end);
    let packing = self.grammar.packing();
    let left_range = self.grammar.left_child_range();
    let right_range = self.grammar.right_child_range();

    let Some(target) = (start + 1..end)
      .filter_map(|m| {
        let (l, r) = (chart.cell(start, m), chart.cell(m, end));
        (!l.is_empty() && !r.is_empty()).then_some(l.inside_step + r.inside_step)
      })
      .max()
    else {
      return;
    };
    scratch.inside_step = target;

    for mid in start + 1..end {
      let left = chart.cell(start, mid);
      let right = chart.cell(mid, end);
      if left.is_empty() || right.is_empty() {
        continue;
      }
      // more than one step below the largest product is negligible
      let delta = left.inside_step + right.inside_step - target;
      let sum_inside = delta >= -1;

      for i in 0..left.len() {
        let l = left.nts[i];
        if !left_range.contains(&l) {
          continue;
        }
        for j in 0..right.len() {
          let r = right.nts[j];
          if !right_range.contains(&r) {
            continue;
          }
          let column = packing.pack(l, r);
          if column == INVALID {
            continue;
          }
          let parents = if only_factored {
            self.grammar.factored_binary_column(column)
          } else {
            self.grammar.binary_column(column)
          };
          let children_inside = S::times(left.inside[i], right.inside[j]);
          let children_score = left.viterbi[i] + right.viterbi[j];
          for (parent, prob, log_prob) in parents.iter() {
            if sum_inside {
              let value = S::times(S::weight(prob, log_prob), children_inside);
              scratch.add_inside(parent, S::adjust(value, delta));
            }
            scratch.relax(parent, log_prob + children_score, column, mid as u32);
          }
        }
      }
    }
  }

  /// Exhaustive unary closure: `next = base + U * current`, iterated
  /// `exhaustive_unary_iterations` times, with Viterbi relaxation over as many rounds
  fn unary_closure(&self, ctx: &mut ParseContext<S>, scratch: &mut ScratchCell<S>) {
    let iterations = self.config.exhaustive_unary_iterations;
    let packing = self.grammar.packing();
    let end = scratch.end as u32;

    ctx.snapshot.clear();
    ctx.active.clear();
    for &nt in scratch.touched() {
      let value = scratch.inside[nt as usize];
      ctx.snapshot.push((nt, value, scratch.viterbi[nt as usize]));
      ctx.current[nt as usize] = value;
      ctx.active.push(nt);
    }

    for _ in 0..iterations {
      ctx.next_active.clear();
      for &(nt, value, _) in ctx.snapshot.iter() {
        ctx.next[nt as usize] = value;
        ctx.flags[nt as usize] = true;
        ctx.next_active.push(nt);
      }
      for &child in ctx.active.iter() {
        let value = ctx.current[child as usize];
        if S::is_zero(value) {
          continue;
        }
        for (parent, prob, log_prob) in self.grammar.unary_parents(child).iter() {
          if parent == child {
            continue;
          }
          let p = parent as usize;
          if !ctx.flags[p] {
            ctx.flags[p] = true;
            ctx.next_active.push(parent);
          }
          ctx.next[p] = S::plus(ctx.next[p], S::times(S::weight(prob, log_prob), value));
        }
      }
      for &nt in ctx.next_active.iter() {
        ctx.flags[nt as usize] = false;
      }
      for &nt in ctx.active.iter() {
        ctx.current[nt as usize] = S::zero();
      }
      std::mem::swap(&mut ctx.current, &mut ctx.next);
      std::mem::swap(&mut ctx.active, &mut ctx.next_active);
    }

    for &nt in ctx.active.iter() {
      scratch.set_inside(nt, ctx.current[nt as usize]);
      ctx.current[nt as usize] = S::zero();
    }

    for _ in 0..iterations {
      let mut improved = false;
      let mut k = 0;
      while k < scratch.touched().len() {
        let child = scratch.touched()[k];
        let score = scratch.viterbi[child as usize];
        k += 1;
        if !score.is_finite() {
          continue;
        }
        let packed = packing.pack_unary(child);
        for (parent, _, log_prob) in self.grammar.unary_parents(child).iter() {
          if parent != child {
            improved |= scratch.relax(parent, log_prob + score, packed, end);
          }
        }
      }
      if !improved {
        break;
      }
    }
  }

  /// Selects at most `width` entries of `scratch` into `ctx.selected`, then
  /// lets one level of unary parents over the survivors compete for the beam
  fn prune(&self, ctx: &mut ParseContext<S>, scratch: &mut ScratchCell<S>, width: usize, beam: &Beam, unary_open: bool) {
    let (start, end) = (scratch.start, scratch.end);
    let threshold = scratch.max_viterbi() - beam.max_local_delta;
    if threshold == f64::NEG_INFINITY || threshold.is_nan() {
      return;
    }

    let budget = if end - start == 1 && unary_open {
      width.saturating_sub(beam.lexical_row_unaries).max(1)
    } else {
      width
    };
    ctx.queue.reset(budget);
    for &nt in scratch.touched() {
      let score = scratch.viterbi[nt as usize];
      if score >= threshold {
        ctx.queue.push(self.fom.score(start, end, nt, score), nt);
      }
    }
    ctx.queue.drain_sorted(&mut ctx.ranked);
    ctx.selected.extend(ctx.ranked.iter().map(|&(nt, _)| nt));

    if !unary_open || ctx.selected.is_empty() {
      return;
    }

    ctx.snapshot.clear();
    for &nt in ctx.selected.iter() {
      ctx.snapshot.push((nt, scratch.inside[nt as usize], scratch.viterbi[nt as usize]));
      ctx.flags[nt as usize] = true;
    }

    // unary edges over the survivors, merged by max with ties to the unary edge
    let packing = self.grammar.packing();
    let end_marker = end as u32;
    ctx.proposals.clear();
    for &(child, child_inside, child_score) in ctx.snapshot.iter() {
      let packed = packing.pack_unary(child);
      for (parent, prob, log_prob) in self.grammar.unary_parents(child).iter() {
        if parent == child {
          continue;
        }
        let p = parent as usize;
        if !ctx.flags[p] {
          ctx.flags[p] = true;
          ctx.proposals.push(parent);
        }
        let unary_inside = S::times(S::weight(prob, log_prob), child_inside);
        if unary_inside >= scratch.inside[p] {
          scratch.set_inside(parent, unary_inside);
        }
        // a tie mustn't close a unary cycle through `child`
        if !self.unary_chain_reaches(scratch, child, parent) {
          scratch.relax_or_tie(parent, log_prob + child_score, packed, end_marker);
        }
      }
    }
    for &nt in ctx.selected.iter().chain(ctx.proposals.iter()) {
      ctx.flags[nt as usize] = false;
    }
    if ctx.proposals.is_empty() {
      return;
    }

    // survivors and new unary parents compete for the whole width
    ctx.queue.reset(width);
    for &nt in ctx.selected.iter().chain(ctx.proposals.iter()) {
      let score = scratch.viterbi[nt as usize];
      if score >= threshold {
        ctx.queue.push(self.fom.score(start, end, nt, score), nt);
      }
    }
    ctx.queue.drain_sorted(&mut ctx.ranked);
    ctx.selected.clear();
    ctx.selected.extend(ctx.ranked.iter().map(|&(nt, _)| nt));

    // a unary entry can't outlive its child
    for &nt in ctx.selected.iter() {
      ctx.flags[nt as usize] = true;
    }
    loop {
      let before = ctx.selected.len();
      let flags = &mut ctx.flags;
      ctx.selected.retain(|&nt| match packing.unpack(scratch.children[nt as usize]) {
        Unpacked::Unary(child) if !flags[child as usize] => {
          flags[nt as usize] = false;
          false
        }
        _ => true,
      });
      if ctx.selected.len() == before {
        break;
      }
    }
    for &nt in ctx.selected.iter() {
      ctx.flags[nt as usize] = false;
    }
  }

  /// Whether following unary backpointers down from `from` reaches `target`
  fn unary_chain_reaches(&self, scratch: &ScratchCell<S>, from: NonTerminal, target: NonTerminal) -> bool {
    let packing = self.grammar.packing();
    let mut nt = from;
    for _ in 0..self.grammar.num_non_terminals() {
      match packing.unpack(scratch.children[nt as usize]) {
        Unpacked::Unary(child) if child == target => return true,
        Unpacked::Unary(child) => nt = child,
        _ => return false,
      }
    }
    true
  }

  /// Largest `outside(parent) * inside(sibling)` scale step over the parents of `(start, end)`
  fn outside_target(chart: &Chart<S>, start: usize, end: usize) -> Option<i32> {
    let n = chart.size();
    let as_right = (0..start).map(|ps| (chart.cell(ps, end), chart.cell(ps, start)));
    let as_left = (end + 1..=n).map(|pe| (chart.cell(start, pe), chart.cell(end, pe)));
    as_right
      .chain(as_left)
      .filter(|(parent, sibling)| !sibling.is_empty() && has_mass::<S>(parent.outside))
      .map(|(parent, sibling)| parent.outside_step + sibling.inside_step)
      .max()
  }

  /// Fills the outside values of every cell, top-down. Runs only after a
  /// successful inside pass.
  fn outside(&self, ctx: &mut ParseContext<S>, beam: &Beam, selector: &dyn CellSelector) {
    let n = ctx.chart.size();
    let start_symbol = self.grammar.start_symbol();
    let unary_passes = if beam.exhaustive {
      self.config.exhaustive_unary_iterations.max(1)
    } else {
      1
    };

    for (start, end) in selector.outside_order(n) {
      let chart = &ctx.chart;
      let cell = chart.cell(start, end);
      if cell.is_empty() {
        continue;
      }
      for &nt in cell.nts {
        ctx.flags[nt as usize] = true;
      }

      let step = if start == 0 && end == n {
        if cell.contains(start_symbol) {
          ctx.outside[start_symbol as usize] = S::one();
        }
        Some(0)
      } else {
        let target = Self::outside_target(chart, start, end);
        if let Some(target) = target {
          self.outside_as_right_child(chart, &cell, target, &ctx.flags, &mut ctx.outside);
          self.outside_as_left_child(chart, &cell, target, &mut ctx.outside);
        }
        target
      };

      if let Some(step) = step {
        self.outside_unary(&cell, unary_passes, &ctx.flags, &mut ctx.outside);
        let entries = cell.len();
        ctx.chart.set_outside(start, end, &ctx.outside, step);
        trace!(start, end, entries, step, "outside");
      }

      for &nt in ctx.chart.cell(start, end).nts {
        ctx.flags[nt as usize] = false;
        ctx.outside[nt as usize] = S::zero();
      }
    }
  }

  /// `cell` as the right child of `(ps, end)` next to `(ps, start)`, scanning
  /// the right-child matrix keyed by `(parent, left sibling)`
  fn outside_as_right_child(&self, chart: &Chart<S>, cell: &Cell<'_>, target: i32, members: &[bool], out: &mut [f64]) {
    let packing = self.grammar.right_child_packing();
    for ps in 0..cell.start {
      let parent = chart.cell(ps, cell.end);
      let left = chart.cell(ps, cell.start);
      if parent.is_empty() || left.is_empty() {
        continue;
      }
      let delta = parent.outside_step + left.inside_step - target;
      if delta < -1 {
        continue;
      }
      for pi in 0..parent.len() {
        if S::is_zero(parent.outside[pi]) {
          continue;
        }
        for li in 0..left.len() {
          let column = packing.pack(parent.nts[pi], left.nts[li]);
          if column == INVALID {
            continue;
          }
          let context = S::adjust(S::times(parent.outside[pi], left.inside[li]), delta);
          for (right, prob, log_prob) in self.grammar.right_child_column(column).iter() {
            if members[right as usize] {
              let slot = &mut out[right as usize];
              *slot = S::plus(*slot, S::times(S::weight(prob, log_prob), context));
            }
          }
        }
      }
    }
  }

  /// `cell` as the left child of `(start, pe)` next to `(end, pe)`
  fn outside_as_left_child(&self, chart: &Chart<S>, cell: &Cell<'_>, target: i32, out: &mut [f64]) {
    let packing = self.grammar.packing();
    for pe in cell.end + 1..=chart.size() {
      let parent = chart.cell(cell.start, pe);
      let right = chart.cell(cell.end, pe);
      if parent.is_empty() || right.is_empty() {
        continue;
      }
      let delta = parent.outside_step + right.inside_step - target;
      if delta < -1 {
        continue;
      }
      for li in 0..cell.len() {
        let l = cell.nts[li];
        for ri in 0..right.len() {
          let column = packing.pack(l, right.nts[ri]);
          if column == INVALID {
            continue;
          }
          for (p, prob, log_prob) in self.grammar.binary_column(column).iter() {
            let Some(pi) = parent.index_of(p) else {
              continue;
            };
            if S::is_zero(parent.outside[pi]) {
              continue;
            }
            let context = S::adjust(S::times(parent.outside[pi], right.inside[ri]), delta);
            let slot = &mut out[l as usize];
            *slot = S::plus(*slot, S::times(S::weight(prob, log_prob), context));
          }
        }
      }
    }
  }

  /// Only the best unary derivation of an entry is kept, so children take the
  /// max over their unary parents rather than the sum
  fn outside_unary(&self, cell: &Cell<'_>, passes: usize, members: &[bool], out: &mut [f64]) {
    for _ in 0..passes {
      for &parent in cell.nts {
        let out_p = out[parent as usize];
        if S::is_zero(out_p) {
          continue;
        }
        for (child, prob, log_prob) in self.grammar.unary_children(parent).iter() {
          if child == parent || !members[child as usize] {
            continue;
          }
          let value = S::times(S::weight(prob, log_prob), out_p);
          if value > out[child as usize] {
            out[child as usize] = value;
          }
        }
      }
    }
  }
}

fn has_mass<S: ProbabilitySemiring>(values: &[f64]) -> bool {
  values.iter().any(|&v| !S::is_zero(v))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cells::ConstrainedCells;
  use crate::config::{DecodeMethod, ReparseStrategy};
  use crate::semiring::Log;

  macro_rules! grammar_file {
    ($name:expr) => {
      include_str!(concat!("../grammars/", $name))
    };
  }

  fn fish() -> SparseGrammar {
    grammar_file!("fish.gr").parse().unwrap()
  }

  fn report() -> SparseGrammar {
    grammar_file!("report.gr").parse().unwrap()
  }

  fn tokens(sentence: &str) -> Vec<&str> {
    sentence.split_whitespace().collect()
  }

  #[test]
  fn test_fish_inside() {
    let g = fish();
    let parser = InsideOutsideParser::new(&g, ParserConfig::default()).unwrap();
    let mut ctx = parser.new_context();
    let outcome = parser.parse(&mut ctx, &tokens("The fish market stands last"));
    assert!(outcome.is_parsed());
    let parse = outcome.parse().unwrap();
    assert_eq!(parse.stage, ReparseStage::Normal);
    // .3 * .25 + .2 * (.5 * .25)
    assert!((parse.inside_ln - 0.1f64.ln()).abs() < 1e-9);

    let np = g.nt_id("NP").unwrap();
    let cell = ctx.chart().cell(0, 3);
    let i = cell.index_of(np).unwrap();
    assert!((cell.inside_ln::<Real>(i) - 0.1f64.ln()).abs() < 1e-9);
    // the best derivation goes through @NP
    assert!((cell.viterbi[i] - (0.3f64 * 0.25).ln()).abs() < 1e-9);
  }

  #[test]
  fn test_outside_conserves_probability() {
    let g = fish();
    let parser = InsideOutsideParser::new(&g, ParserConfig::with_decode_method(DecodeMethod::Goodman)).unwrap();
    let mut ctx = parser.new_context();
    let words = tokens("The fish market stands last");
    let outcome = parser.parse(&mut ctx, &words);
    let root_ln = outcome.parse().unwrap().inside_ln;
    let chart = ctx.chart();

    // every derivation puts exactly one preterminal over each word
    for start in 0..words.len() {
      let cell = chart.cell(start, start + 1);
      let total: f64 = (0..cell.len())
        .map(|i| (cell.inside_ln::<Real>(i) + cell.outside_ln::<Real>(i) - root_ln).exp())
        .sum();
      assert!((total - 1.0).abs() < 1e-9, "word {}: {}", start, total);
    }

    let top = chart.cell(0, words.len());
    let root = top.index_of(g.start_symbol()).unwrap();
    assert_eq!(top.outside_ln::<Real>(root), 0.0);
  }

  #[test]
  fn test_long_sentence_is_scaled() {
    let g = fish();
    let parser = InsideOutsideParser::new(&g, ParserConfig {
      reparse: ReparseStrategy::None,
      ..ParserConfig::default()
    })
    .unwrap();
    // NP -> DT NP, 497 times over, ends far below the smallest f64
    let mut words = vec!["The"; 498];
    words.extend(["fish", "market"]);
    let mut ctx = parser.new_context();
    let outcome = parser.parse(&mut ctx, &words);
    assert!(!outcome.is_parsed());

    let top = ctx.chart().cell(0, words.len());
    let i = top.index_of(g.nt_id("NP").unwrap()).unwrap();
    let expected = 497.0 * 0.2f64.ln() + 0.1f64.ln();
    let ln = top.inside_ln::<Real>(i);
    assert!(expected < f64::MIN_POSITIVE.ln());
    assert!((ln - expected).abs() < 1e-6, "{} vs {}", ln, expected);
    assert!(top.inside_step < -7);
    assert!((top.viterbi[i] - (497.0 * 0.2f64.ln() + 0.075f64.ln())).abs() < 1e-6);
  }

  #[test]
  fn test_real_and_log_agree() {
    let g = report();
    let words = tokens("The report is due out tomorrow .");
    let config = ParserConfig::with_decode_method(DecodeMethod::Goodman);
    let real = InsideOutsideParser::new(&g, config.clone()).unwrap();
    let log = InsideOutsideParser::<Log>::with_semiring(&g, config).unwrap();

    let a = real.parse(&mut real.new_context(), &words);
    let b = log.parse(&mut log.new_context(), &words);
    assert!(a.is_parsed() && b.is_parsed());
    assert_eq!(a.tree(), b.tree());
    let (a, b) = (a.parse().unwrap(), b.parse().unwrap());
    assert!((a.inside_ln - b.inside_ln).abs() < 1e-9);
    assert!((a.score - b.score).abs() < 1e-6);
  }

  #[test]
  fn test_context_reuse_matches_fresh_context() {
    let g = report();
    let parser = InsideOutsideParser::new(&g, ParserConfig::with_decode_method(DecodeMethod::MaxRuleProd)).unwrap();
    let mut ctx = parser.new_context();
    parser.parse(&mut ctx, &tokens("The report is due out tomorrow ."));
    let reused = parser.parse(&mut ctx, &tokens("The report is due ."));

    let mut fresh_ctx = parser.new_context();
    let fresh = parser.parse(&mut fresh_ctx, &tokens("The report is due ."));
    assert!(fresh.is_parsed());
    assert_eq!(reused, fresh);
    assert!(ctx.chart() == fresh_ctx.chart());
  }

  #[test]
  fn test_exhaustive_stage() {
    let g = fish();
    let config = ParserConfig {
      reparse: ReparseStrategy::Exhaustive,
      beam_width: 1,
      lexical_row_beam_width: 1,
      lexical_row_unaries: 0,
      ..ParserConfig::with_decode_method(DecodeMethod::Goodman)
    };
    let parser = InsideOutsideParser::new(&g, config).unwrap();
    let outcome = parser.parse_sentence("The fish market stands last");
    assert!(outcome.is_parsed());
    let parse = outcome.parse().unwrap();
    assert_eq!(parse.stage, ReparseStage::Exhaustive);
    assert!((parse.inside_ln - 0.1f64.ln()).abs() < 1e-9);
  }

  #[test]
  fn test_narrow_beam_escalates() {
    let g = report();
    let config = ParserConfig {
      beam_width: 1,
      lexical_row_beam_width: 1,
      lexical_row_unaries: 0,
      ..ParserConfig::default()
    };
    let parser = InsideOutsideParser::new(&g, config).unwrap();
    let outcome = parser.parse_sentence("The report is due out tomorrow .");
    assert!(outcome.is_parsed());
    assert_ne!(outcome.parse().unwrap().stage, ReparseStage::Normal);
  }

  #[test]
  fn test_closed_cells_are_respected() {
    let g = fish();
    let config = ParserConfig {
      reparse: ReparseStrategy::None,
      ..ParserConfig::default()
    };
    let parser = InsideOutsideParser::new(&g, config).unwrap();
    let words = tokens("The fish market stands last");
    let mut ctx = parser.new_context();

    // every NP over "The fish market" needs (1, 3)
    let brackets = ConstrainedCells::from_brackets(5, &[(0, 5), (0, 3), (3, 5)]);
    let outcome = parser.parse_constrained(&mut ctx, &words, &brackets);
    assert_eq!(outcome, ParseOutcome::Failed);
    assert!(ctx.chart().cell(1, 3).is_empty());

    let brackets = ConstrainedCells::from_brackets(5, &[(0, 5), (0, 3), (1, 3), (3, 5)]);
    let outcome = parser.parse_constrained(&mut ctx, &words, &brackets);
    assert!(outcome.is_parsed());
  }

  #[test]
  fn test_failures() {
    let g = fish();
    let parser = InsideOutsideParser::new(&g, ParserConfig::default()).unwrap();
    assert_eq!(parser.parse_sentence(""), ParseOutcome::Failed);
    // no UNK in this lexicon, so the unknown word's cell stays empty
    let outcome = parser.parse_sentence("The fish swims");
    assert_eq!(outcome, ParseOutcome::Failed);
    assert_eq!(outcome.to_string(), "()");
  }

  #[test]
  fn test_partial_parse_is_put_under_start_symbol() {
    let g = fish();
    let parser = InsideOutsideParser::new(&g, ParserConfig::default()).unwrap();
    match parser.parse_sentence("The fish market") {
      ParseOutcome::Partial(p) => {
        assert_eq!(p.stage, ReparseStage::Exhaustive);
        assert_eq!(p.to_string(), "(ROOT (NP (DT The) (NN fish) (NN market)))");
      }
      other => panic!("expected a partial parse, got {:?}", other),
    }
  }

  #[test]
  fn test_viterbi_ties_go_to_unary_edges() {
    let g: SparseGrammar = r#"
      start=ROOT
      ROOT -> X Z 0.0
      X -> Y 0.0
      ===== LEXICON =====
      X -> a -0.6931471806
      Y -> a -0.6931471806
      Z -> b 0.0
    "#
    .parse()
    .unwrap();
    let parser = InsideOutsideParser::new(&g, ParserConfig::default()).unwrap();
    assert_eq!(parser.parse_sentence("a b").to_string(), "(ROOT (X (Y a)) (Z b))");
  }

  #[test]
  fn test_tied_unary_pair_does_not_cycle() {
    let g: SparseGrammar = r#"
      start=ROOT
      ROOT -> A B 0.0
      ROOT -> C B 0.0
      A -> C 0.0
      C -> A 0.0
      ===== LEXICON =====
      A -> a -0.6931471806
      C -> a -0.6931471806
      B -> b 0.0
    "#
    .parse()
    .unwrap();
    let parser = InsideOutsideParser::new(&g, ParserConfig::default()).unwrap();
    let outcome = parser.parse_sentence("a b");
    let parse = outcome.parse().unwrap();
    assert!(outcome.is_parsed());
    assert_eq!(parse.stage, ReparseStage::Normal);
    assert_eq!(parse.tree.leaves(), vec!["a", "b"]);
    assert!(!parse.tree.has_consecutive_unaries());
  }

  #[test]
  fn test_unsplit_grammar_rejects_split_decoders() {
    let g = fish();
    for method in [DecodeMethod::SplitSum, DecodeMethod::MaxRuleProd] {
      let parser = InsideOutsideParser::new(&g, ParserConfig::with_decode_method(method));
      assert!(matches!(parser, Err(ConfigError::RequiresSplitVocabulary { .. })));
    }
    let bad = ParserConfig {
      beam_width: 0,
      ..ParserConfig::default()
    };
    assert!(InsideOutsideParser::new(&g, bad).is_err());
  }
}
