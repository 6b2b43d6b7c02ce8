//! 约束模型
//!
//! 约束是带名字的规则，分为硬约束（必须满足，否则候选方案被拒绝）和
//! 软约束（违反时在目标函数中计入惩罚，但不阻止换班）。

use serde::{Deserialize, Serialize};

use fairshare_errors::{FairshareError, FairshareResult};

/// 约束类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConstraintKind {
    /// 每个Worker的工作项数在其容量上下限之内
    Capacity,
    /// Worker具备工作项要求的资质标签
    Eligibility,
    /// 每个Worker负载与车队平均负载的相对偏差不超过容差
    DifficultyBand,
    /// 工作项所在区域在Worker服务区域之内
    Regional,
    /// 暂停中的Worker不得持有新的工作项（内置）
    Availability,
    /// 每个工作项恰好分配给一个已知Worker（内置）
    Coverage,
}

impl ConstraintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::Capacity => "capacity",
            ConstraintKind::Eligibility => "eligibility",
            ConstraintKind::DifficultyBand => "difficulty-band",
            ConstraintKind::Regional => "regional",
            ConstraintKind::Availability => "availability",
            ConstraintKind::Coverage => "coverage",
        }
    }

    /// 只涉及单个 (工作项, Worker) 组合的约束
    pub fn is_pairwise(&self) -> bool {
        matches!(
            self,
            ConstraintKind::Eligibility | ConstraintKind::Regional | ConstraintKind::Availability
        )
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hardness {
    #[default]
    Hard,
    Soft,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintParameters {
    /// difficulty-band 的相对容差，默认 0.25
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
}

pub const DEFAULT_BAND_TOLERANCE: f64 = 0.25;

fn default_penalty_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub kind: ConstraintKind,
    #[serde(default)]
    pub hardness: Hardness,
    /// 软约束每次违反计入的惩罚权重
    #[serde(default = "default_penalty_weight")]
    pub penalty_weight: f64,
    #[serde(default)]
    pub parameters: ConstraintParameters,
}

impl Constraint {
    pub fn new<S: Into<String>>(name: S, kind: ConstraintKind) -> Self {
        Self {
            name: name.into(),
            kind,
            hardness: Hardness::Hard,
            penalty_weight: default_penalty_weight(),
            parameters: ConstraintParameters::default(),
        }
    }

    pub fn capacity() -> Self {
        Self::new("capacity", ConstraintKind::Capacity)
    }

    pub fn eligibility() -> Self {
        Self::new("eligibility", ConstraintKind::Eligibility)
    }

    pub fn regional() -> Self {
        Self::new("regional", ConstraintKind::Regional)
    }

    pub fn difficulty_band(tolerance: f64) -> Self {
        let mut constraint = Self::new("difficulty-band", ConstraintKind::DifficultyBand);
        constraint.parameters.tolerance = Some(tolerance);
        constraint
    }

    pub fn soft(mut self, penalty_weight: f64) -> Self {
        self.hardness = Hardness::Soft;
        self.penalty_weight = penalty_weight;
        self
    }

    pub fn hard(mut self) -> Self {
        self.hardness = Hardness::Hard;
        self
    }

    pub fn is_hard(&self) -> bool {
        matches!(self.hardness, Hardness::Hard)
    }

    pub fn band_tolerance(&self) -> f64 {
        self.parameters.tolerance.unwrap_or(DEFAULT_BAND_TOLERANCE)
    }

    /// 默认约束集：容量、资质、区域为硬约束，难度带为软约束
    pub fn default_set() -> Vec<Constraint> {
        vec![
            Constraint::capacity(),
            Constraint::eligibility(),
            Constraint::regional(),
            Constraint::difficulty_band(DEFAULT_BAND_TOLERANCE).soft(1.0),
        ]
    }

    pub fn validate(&self) -> FairshareResult<()> {
        if self.name.trim().is_empty() {
            return Err(FairshareError::validation_error("约束名称不能为空"));
        }
        if matches!(self.kind, ConstraintKind::Availability | ConstraintKind::Coverage) {
            return Err(FairshareError::validation_error(format!(
                "约束 {} 的类型 {} 为内置约束，不能配置",
                self.name, self.kind
            )));
        }
        if !self.penalty_weight.is_finite() || self.penalty_weight < 0.0 {
            return Err(FairshareError::validation_error(format!(
                "约束 {} 的惩罚权重无效: {}",
                self.name, self.penalty_weight
            )));
        }
        if let Some(tolerance) = self.parameters.tolerance {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(FairshareError::validation_error(format!(
                    "约束 {} 的容差无效: {}",
                    self.name, tolerance
                )));
            }
        }
        Ok(())
    }
}

/// 一次具体的约束违反
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub constraint: String,
    pub kind: ConstraintKind,
    pub hard: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub detail: String,
    /// 软约束计入的惩罚，硬约束为 0
    pub penalty: f64,
}

/// 单条约束对一个候选方案的满足情况
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintOutcome {
    pub name: String,
    pub kind: ConstraintKind,
    pub hard: bool,
    pub satisfied: bool,
    pub violation_count: usize,
}

/// 约束评估结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub outcomes: Vec<ConstraintOutcome>,
    pub violations: Vec<ConstraintViolation>,
    pub satisfied_count: usize,
    pub violated_count: usize,
    pub penalty_total: f64,
}

impl EvaluationReport {
    pub fn hard_violations(&self) -> impl Iterator<Item = &ConstraintViolation> {
        self.violations.iter().filter(|v| v.hard)
    }

    pub fn soft_violations(&self) -> impl Iterator<Item = &ConstraintViolation> {
        self.violations.iter().filter(|v| !v.hard)
    }

    /// 不存在硬约束违反
    pub fn is_feasible(&self) -> bool {
        self.violations.iter().all(|v| !v.hard)
    }

    pub fn first_hard_violation(&self) -> Option<&ConstraintViolation> {
        self.hard_violations().next()
    }
}
