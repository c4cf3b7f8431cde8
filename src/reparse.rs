//! Beam escalation for sentences the configured beam can't parse.

use std::fmt;

use tracing::debug;

use crate::config::{ParserConfig, ReparseStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReparseStage {
  /// The configured beam
  Normal,
  /// `fixed_beam_width`, without cell constraints
  FixedBeam,
  /// Twice the previous beam
  Double,
  /// No pruning at all
  Exhaustive,
}

impl fmt::Display for ReparseStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Normal => "normal",
      Self::FixedBeam => "fixed-beam",
      Self::Double => "double",
      Self::Exhaustive => "exhaustive",
    };
    write!(f, "{}", name)
  }
}

impl ReparseStrategy {
  /// The stages tried, in order
  pub fn stages(&self) -> &'static [ReparseStage] {
    use ReparseStage::*;
    match self {
      Self::None => &[Normal],
      Self::Double => &[Normal, Double, Double, Double],
      Self::FixedBeam => &[Normal, FixedBeam],
      Self::Exhaustive => &[Normal, Exhaustive],
      Self::Escalate => &[Normal, Double, Double, Double, FixedBeam, Exhaustive],
    }
  }
}

/// Pruning settings for one pass over the chart
#[derive(Debug, Clone, PartialEq)]
pub struct Beam {
  pub stage: ReparseStage,
  pub beam_width: usize,
  pub lexical_row_beam_width: usize,
  pub lexical_row_unaries: usize,
  pub max_local_delta: f64,
  /// Whether the cell selector's constraints apply
  pub constrained: bool,
  /// Full unary closure and no beam
  pub exhaustive: bool,
}

impl Beam {
  /// Entries a cell may need to hold under this beam
  pub fn cell_capacity(&self) -> usize {
    self.beam_width.max(self.lexical_row_beam_width)
  }

  /// Limits the widths to `num_nts`. A lexical row that holds every
  /// non-terminal needs no slots held back for unaries.
  fn clamped(mut self, num_nts: usize) -> Self {
    self.beam_width = self.beam_width.min(num_nts);
    if self.lexical_row_beam_width >= num_nts {
      self.lexical_row_beam_width = num_nts;
      self.lexical_row_unaries = 0;
    }
    self
  }
}

/// Iterates the beams of a [`ReparseStrategy`], skipping doubling stages that
/// would reach exhaustive width
#[derive(Debug, Clone)]
pub struct Escalation {
  stages: std::slice::Iter<'static, ReparseStage>,
  num_nts: usize,
  fixed_beam_width: usize,
  normal: Beam,
  /// the running beam doubled by `Double` stages
  current: Beam,
}

impl Escalation {
  pub fn new(config: &ParserConfig, num_nts: usize) -> Self {
    let num_nts = num_nts.max(1);
    let normal = Beam {
      stage: ReparseStage::Normal,
      beam_width: config.beam_width,
      lexical_row_beam_width: config.lexical_row_beam_width,
      lexical_row_unaries: config.lexical_row_unaries,
      max_local_delta: config.max_local_delta,
      constrained: true,
      exhaustive: false,
    }
    .clamped(num_nts);
    Self {
      stages: config.reparse.stages().iter(),
      num_nts,
      fixed_beam_width: config.fixed_beam_width,
      current: normal.clone(),
      normal,
    }
  }

  fn exhaustive(&self) -> Beam {
    Beam {
      stage: ReparseStage::Exhaustive,
      beam_width: self.num_nts,
      lexical_row_beam_width: self.num_nts,
      lexical_row_unaries: 0,
      max_local_delta: f64::INFINITY,
      constrained: false,
      exhaustive: true,
    }
  }
}

impl Iterator for Escalation {
  type Item = Beam;

  fn next(&mut self) -> Option<Beam> {
    loop {
      let stage = *self.stages.next()?;
      let beam = match stage {
        ReparseStage::Normal => self.normal.clone(),
        ReparseStage::Double => {
          // the running beam doubles even when the stage is skipped
          let c = &mut self.current;
          c.stage = ReparseStage::Double;
          c.beam_width = c.beam_width.saturating_mul(2);
          c.lexical_row_beam_width = c.lexical_row_beam_width.saturating_mul(2);
          c.lexical_row_unaries = c.lexical_row_unaries.saturating_mul(2);
          c.max_local_delta *= 2.0;
          if c.beam_width >= self.num_nts {
            debug!(width = c.beam_width, "skipping doubled beam at exhaustive width");
            continue;
          }
          c.clone().clamped(self.num_nts)
        }
        ReparseStage::FixedBeam => {
          let width = self.fixed_beam_width.min(self.num_nts);
          Beam {
            stage,
            beam_width: width,
            lexical_row_beam_width: width.max(self.normal.lexical_row_beam_width),
            constrained: false,
            ..self.normal.clone()
          }
          .clamped(self.num_nts)
        }
        ReparseStage::Exhaustive => self.exhaustive(),
      };
      return Some(beam);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config(reparse: ReparseStrategy) -> ParserConfig {
    ParserConfig {
      beam_width: 10,
      lexical_row_beam_width: 20,
      lexical_row_unaries: 5,
      reparse,
      ..Default::default()
    }
  }

  #[test]
  fn test_stage_lists() {
    let stages = |s: ReparseStrategy| {
      Escalation::new(&config(s), 10_000)
        .map(|b| b.stage)
        .collect::<Vec<_>>()
    };
    use ReparseStage::*;
    assert_eq!(stages(ReparseStrategy::None), vec![Normal]);
    assert_eq!(stages(ReparseStrategy::Double), vec![Normal, Double, Double, Double]);
    assert_eq!(stages(ReparseStrategy::FixedBeam), vec![Normal, FixedBeam]);
    assert_eq!(stages(ReparseStrategy::Exhaustive), vec![Normal, Exhaustive]);
    assert_eq!(
      stages(ReparseStrategy::Escalate),
      vec![Normal, Double, Double, Double, FixedBeam, Exhaustive]
    );
  }

  #[test]
  fn test_doubling() {
    let beams: Vec<Beam> = Escalation::new(&config(ReparseStrategy::Double), 10_000).collect();
    let widths: Vec<usize> = beams.iter().map(|b| b.beam_width).collect();
    assert_eq!(widths, vec![10, 20, 40, 80]);
    assert_eq!(beams[3].lexical_row_beam_width, 160);
    assert_eq!(beams[3].lexical_row_unaries, 40);
    assert_eq!(beams[3].max_local_delta, 15.0 * 8.0);
    assert!(beams.iter().all(|b| b.constrained && !b.exhaustive));
  }

  #[test]
  fn test_small_grammar_keeps_whole_lexical_row() {
    let normal = Escalation::new(&config(ReparseStrategy::None), 9).next().unwrap();
    assert_eq!(normal.beam_width, 9);
    assert_eq!(normal.lexical_row_beam_width, 9);
    assert_eq!(normal.lexical_row_unaries, 0);
  }

  #[test]
  fn test_doubling_skips_ahead_to_exhaustive() {
    // 10 -> 20 -> 40 -> 80: only the first doubling stays under 35 non-terminals
    let beams: Vec<Beam> = Escalation::new(&config(ReparseStrategy::Escalate), 35).collect();
    let stages: Vec<ReparseStage> = beams.iter().map(|b| b.stage).collect();
    use ReparseStage::*;
    assert_eq!(stages, vec![Normal, Double, FixedBeam, Exhaustive]);
    assert_eq!(beams[1].beam_width, 20);
    assert_eq!(beams[1].lexical_row_beam_width, 35);
    assert_eq!(beams[1].lexical_row_unaries, 0);

    let fixed = &beams[2];
    assert_eq!(fixed.beam_width, 35);
    assert_eq!(fixed.lexical_row_unaries, 0);
    assert_eq!(fixed.max_local_delta, 15.0);
    assert!(!fixed.constrained);

    let exhaustive = &beams[3];
    assert!(exhaustive.exhaustive);
    assert_eq!(exhaustive.beam_width, 35);
    assert_eq!(exhaustive.max_local_delta, f64::INFINITY);
  }
}
