// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/ripeness.rs - 熟度判定
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::{config::PipelineConfig, model::LabelParts};

pub const NOT_TRACKED_LABEL: &str = "Not tracked";

/// 标签中的熟度标记，按匹配优先级排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RipenessToken {
  Unripe,
  Slightly,
  Almost,
  Ripe,
}

impl RipenessToken {
  const PRECEDENCE: [(&'static str, RipenessToken); 4] = [
    ("unripe", RipenessToken::Unripe),
    ("slightly", RipenessToken::Slightly),
    ("almost", RipenessToken::Almost),
    ("ripe", RipenessToken::Ripe),
  ];

  /// 小写后按 unripe → slightly → almost → ripe 的顺序做子串匹配
  pub fn detect(text: &str) -> Option<Self> {
    let lower = text.to_lowercase();
    Self::PRECEDENCE
      .iter()
      .find(|(needle, _)| lower.contains(needle))
      .map(|(_, token)| *token)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RipenessStage {
  Unripe,
  SlightlyRipe,
  AlmostRipe,
  Ripe,
  Unknown,
}

impl RipenessStage {
  pub fn from_token(token: Option<RipenessToken>) -> Self {
    match token {
      Some(RipenessToken::Unripe) => RipenessStage::Unripe,
      Some(RipenessToken::Slightly) => RipenessStage::SlightlyRipe,
      Some(RipenessToken::Almost) => RipenessStage::AlmostRipe,
      Some(RipenessToken::Ripe) => RipenessStage::Ripe,
      None => RipenessStage::Unknown,
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      RipenessStage::Unripe => "Unripe",
      RipenessStage::SlightlyRipe => "Slightly Ripe",
      RipenessStage::AlmostRipe => "Almost Ripe",
      RipenessStage::Ripe => "Ripe",
      RipenessStage::Unknown => "Unknown",
    }
  }

  /// 进度百分比，与阶段绑定
  pub fn progress(&self) -> u8 {
    match self {
      RipenessStage::Unripe => 25,
      RipenessStage::SlightlyRipe => 45,
      RipenessStage::AlmostRipe => 70,
      RipenessStage::Ripe => 100,
      RipenessStage::Unknown => 0,
    }
  }

  pub fn remediation(&self) -> &'static str {
    match self {
      RipenessStage::Unripe => {
        "Estimated 7–10 days to full ripeness\nStore at room temperature for best results"
      }
      RipenessStage::SlightlyRipe => "Estimated 4–6 days to full ripeness\nKeep at room temperature",
      RipenessStage::AlmostRipe => "Estimated 1–3 days to fully ripen\nKeep at room temperature",
      RipenessStage::Ripe => "No estimation since it's Ripe already",
      RipenessStage::Unknown => "",
    }
  }
}

impl fmt::Display for RipenessStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// 判定结果：封闭集合中的一个阶段，或明确的“未跟踪”
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ripeness {
  Stage(RipenessStage),
  NotTracked,
}

impl Ripeness {
  pub fn stage(&self) -> Option<RipenessStage> {
    match self {
      Ripeness::Stage(stage) => Some(*stage),
      Ripeness::NotTracked => None,
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Ripeness::Stage(stage) => stage.label(),
      Ripeness::NotTracked => NOT_TRACKED_LABEL,
    }
  }

  pub fn progress(&self) -> Option<u8> {
    self.stage().map(|s| s.progress())
  }

  pub fn remediation(&self) -> &'static str {
    self.stage().map(|s| s.remediation()).unwrap_or("")
  }
}

impl fmt::Display for Ripeness {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurveyError {
  #[error("{field} 取值 {value} 超出范围 [0, 3]")]
  OutOfRange { field: &'static str, value: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Firmness {
  VeryHard = 0,
  Firm = 1,
  Yielding = 2,
  Soft = 3,
}

impl Firmness {
  pub const ALL: [Firmness; 4] = [
    Firmness::VeryHard,
    Firmness::Firm,
    Firmness::Yielding,
    Firmness::Soft,
  ];

  pub fn label(&self) -> &'static str {
    match self {
      Firmness::VeryHard => "Very hard",
      Firmness::Firm => "Firm (slightly yielding)",
      Firmness::Yielding => "Firm but gives easily",
      Firmness::Soft => "Soft",
    }
  }
}

impl TryFrom<u8> for Firmness {
  type Error = SurveyError;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    Firmness::ALL
      .get(value as usize)
      .copied()
      .ok_or(SurveyError::OutOfRange {
        field: "firmness",
        value,
      })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Aroma {
  None = 0,
  VeryFaint = 1,
  Mild = 2,
  Strong = 3,
}

impl Aroma {
  pub const ALL: [Aroma; 4] = [Aroma::None, Aroma::VeryFaint, Aroma::Mild, Aroma::Strong];

  pub fn label(&self) -> &'static str {
    match self {
      Aroma::None => "None",
      Aroma::VeryFaint => "Very faint",
      Aroma::Mild => "Mild",
      Aroma::Strong => "Strong",
    }
  }
}

impl TryFrom<u8> for Aroma {
  type Error = SurveyError;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    Aroma::ALL
      .get(value as usize)
      .copied()
      .ok_or(SurveyError::OutOfRange {
        field: "aroma",
        value,
      })
  }
}

/// 手动感官评估：硬度与香气，均为 0–3 的序数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorySurvey {
  pub firmness: Firmness,
  pub aroma: Aroma,
}

impl SensorySurvey {
  pub fn new(firmness: u8, aroma: u8) -> Result<Self, SurveyError> {
    Ok(Self {
      firmness: Firmness::try_from(firmness)?,
      aroma: Aroma::try_from(aroma)?,
    })
  }

  /// 离散查表，不做插值
  pub fn stage(&self) -> RipenessStage {
    match (self.firmness as u8, self.aroma as u8) {
      (0, 0) => RipenessStage::Unripe,
      (1, 0) | (0, 1) => RipenessStage::SlightlyRipe,
      (3, 3) => RipenessStage::Ripe,
      _ => RipenessStage::AlmostRipe,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarietyClass {
  /// 模型带有熟度信号
  Tracked,
  /// 需要手动感官评估
  Survey,
  Untracked,
}

/// 品种归类；名称按小写子串匹配，先查 tracked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarietyCatalog {
  tracked: Vec<String>,
  survey: Vec<String>,
}

impl VarietyCatalog {
  pub fn new<S: AsRef<str>>(tracked: &[S], survey: &[S]) -> Self {
    let lower = |names: &[S]| {
      names
        .iter()
        .map(|n| n.as_ref().trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .collect()
    };
    Self {
      tracked: lower(tracked),
      survey: lower(survey),
    }
  }

  pub fn classify(&self, variety: &str) -> VarietyClass {
    let variety = variety.to_lowercase();
    if self.tracked.iter().any(|name| variety.contains(name.as_str())) {
      VarietyClass::Tracked
    } else if self.survey.iter().any(|name| variety.contains(name.as_str())) {
      VarietyClass::Survey
    } else {
      VarietyClass::Untracked
    }
  }
}

pub struct RipenessResolver {
  catalog: VarietyCatalog,
}

impl RipenessResolver {
  pub fn new(catalog: VarietyCatalog) -> Self {
    Self { catalog }
  }

  pub fn from_config(config: &PipelineConfig) -> Self {
    Self::new(VarietyCatalog::new(
      &config.tracked_varieties,
      &config.survey_varieties,
    ))
  }

  pub fn classify(&self, variety: &str) -> VarietyClass {
    self.catalog.classify(variety)
  }

  /// 自动路径：只有 tracked 品种使用标签里的熟度标记
  pub fn resolve(&self, parts: &LabelParts) -> (VarietyClass, Ripeness) {
    let class = self.classify(&parts.variety);
    let ripeness = match class {
      VarietyClass::Tracked => Ripeness::Stage(RipenessStage::from_token(parts.token)),
      VarietyClass::Survey | VarietyClass::Untracked => Ripeness::NotTracked,
    };
    debug!(
      "品种 {} 归类为 {:?}, 熟度 {}",
      parts.variety, class, ripeness
    );
    (class, ripeness)
  }

  /// 手动路径
  pub fn assess(&self, survey: &SensorySurvey) -> RipenessStage {
    let stage = survey.stage();
    debug!(
      "感官评估: 硬度 {:?}, 香气 {:?} => {}",
      survey.firmness, survey.aroma, stage
    );
    stage
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn resolver() -> RipenessResolver {
    RipenessResolver::new(VarietyCatalog::new(
      &["cebu", "carabao"],
      &["kabayo", "indian", "apple"],
    ))
  }

  #[test]
  fn token_precedence() {
    assert_eq!(RipenessToken::detect("Unripe"), Some(RipenessToken::Unripe));
    assert_eq!(
      RipenessToken::detect("slightly_ripe"),
      Some(RipenessToken::Slightly)
    );
    assert_eq!(
      RipenessToken::detect("Almost_Ripe"),
      Some(RipenessToken::Almost)
    );
    assert_eq!(RipenessToken::detect("RIPE"), Some(RipenessToken::Ripe));
    assert_eq!(RipenessToken::detect("Mango"), None);
  }

  #[test]
  fn survey_table_boundaries() {
    let stage = |f, a| SensorySurvey::new(f, a).unwrap().stage();
    assert_eq!(stage(0, 0), RipenessStage::Unripe);
    assert_eq!(stage(1, 0), RipenessStage::SlightlyRipe);
    assert_eq!(stage(0, 1), RipenessStage::SlightlyRipe);
    assert_eq!(stage(3, 3), RipenessStage::Ripe);
    assert_eq!(stage(2, 1), RipenessStage::AlmostRipe);
    assert_eq!(stage(1, 1), RipenessStage::AlmostRipe);
    assert_eq!(stage(3, 2), RipenessStage::AlmostRipe);
    assert_eq!(stage(0, 3), RipenessStage::AlmostRipe);
  }

  #[test]
  fn survey_ordinals_map_to_labels() {
    let survey = SensorySurvey::new(2, 1).unwrap();
    assert_eq!(survey.firmness.label(), "Firm but gives easily");
    assert_eq!(survey.aroma.label(), "Very faint");
    assert_eq!(Firmness::ALL[0].label(), "Very hard");
    assert_eq!(Aroma::ALL[3].label(), "Strong");
  }

  #[test]
  fn survey_rejects_out_of_range() {
    assert_eq!(
      SensorySurvey::new(4, 0),
      Err(SurveyError::OutOfRange {
        field: "firmness",
        value: 4
      })
    );
    assert!(SensorySurvey::new(0, 9).is_err());
  }

  #[test]
  fn stage_carries_progress_and_remediation() {
    assert_eq!(RipenessStage::Unripe.progress(), 25);
    assert!(RipenessStage::Unripe.remediation().starts_with("Estimated 7–10 days"));
    assert_eq!(RipenessStage::Ripe.progress(), 100);
    assert_eq!(
      RipenessStage::Ripe.remediation(),
      "No estimation since it's Ripe already"
    );
    assert_eq!(Ripeness::NotTracked.progress(), None);
    assert_eq!(Ripeness::NotTracked.remediation(), "");
  }

  #[test]
  fn tracked_variety_uses_token() {
    let (class, ripeness) = resolver().resolve(&LabelParts::parse("Cebu_Almost_Ripe"));
    assert_eq!(class, VarietyClass::Tracked);
    assert_eq!(ripeness, Ripeness::Stage(RipenessStage::AlmostRipe));
    assert_eq!(ripeness.label(), "Almost Ripe");
  }

  #[test]
  fn tracked_variety_without_token_is_unknown() {
    let (_, ripeness) = resolver().resolve(&LabelParts::parse("Carabao"));
    assert_eq!(ripeness, Ripeness::Stage(RipenessStage::Unknown));
  }

  #[test]
  fn untracked_variety_ignores_token() {
    let (class, ripeness) = resolver().resolve(&LabelParts::parse("Pico_Ripe"));
    assert_eq!(class, VarietyClass::Untracked);
    assert_eq!(ripeness, Ripeness::NotTracked);

    let (class, ripeness) = resolver().resolve(&LabelParts::parse("Indian_Ripe"));
    assert_eq!(class, VarietyClass::Survey);
    assert_eq!(ripeness, Ripeness::NotTracked);
  }

  #[test]
  fn catalog_match_is_case_insensitive() {
    let catalog = VarietyCatalog::new(&["  CEBU "], &["Apple"]);
    assert_eq!(catalog.classify("cebu"), VarietyClass::Tracked);
    assert_eq!(catalog.classify("Apple Mango"), VarietyClass::Survey);
    assert_eq!(catalog.classify("Unknown"), VarietyClass::Untracked);
  }
}
