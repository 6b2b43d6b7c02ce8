//! 批量分配求解器
//!
//! 1. 构造问题：可用Worker、硬约束允许的 (工作项, Worker) 组合、容量上下限
//! 2. 以最大流检查可行性，并把各个初始方案修复为可行方案
//! 3. 确定性的局部搜索（迁移、互换），再做若干次固定种子的扰动重启
//! 4. 用约束评估器复核全部候选方案，按 目标值 → 变动数 → 字典序 选出结果
//!
//! 相同输入与相同种子总是得到相同结果。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use fairshare_config::SolverConfig;
use fairshare_domain::{
    BindingConstraint, Constraint, ConstraintKind, EvaluationReport, FairnessSnapshot,
    FairshareError, FairshareResult, WorkItem, Worker,
};

use crate::constraints::{pair_allowed, CandidateAssignment, ConstraintEvaluator, EvaluationScope};
use crate::fairness::{gini, index_items, LoadModel};
use crate::strategies::{
    round_robin_baseline, LeastLoadedSeed, MaxFlowSeed, PreviousAssignmentSeed, RoundRobinSeed,
    SeedStrategy,
};

const EPS: f64 = 1e-9;
/// 硬难度带在搜索中按大惩罚处理，最终仍由评估器判定
const HARD_BAND_PENALTY: f64 = 1_000.0;

pub struct SolveRequest<'a> {
    pub items: &'a [WorkItem],
    pub workers: &'a [Worker],
    pub constraints: &'a [Constraint],
    /// 上一版基线，用于尽量减少变动
    pub previous: Option<&'a BTreeMap<String, String>>,
}

#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub placements: BTreeMap<String, String>,
    pub snapshot: FairnessSnapshot,
    pub report: EvaluationReport,
    pub objective: f64,
    /// 相对上一版基线改变归属的工作项数
    pub churn: usize,
    /// 朴素轮询方案的Gini系数
    pub round_robin_gini: f64,
    pub candidates_evaluated: usize,
}

struct Band {
    tolerance: f64,
    weight: f64,
    hard: bool,
}

/// 以下标表示的求解问题，工作项与Worker均按ID排序
pub struct Problem<'a> {
    pub items: Vec<&'a WorkItem>,
    pub workers: Vec<&'a Worker>,
    pub item_load: Vec<f64>,
    pub base_load: Vec<f64>,
    /// 每个工作项在硬约束下允许的Worker
    pub allowed: Vec<Vec<usize>>,
    pub min_cap: Vec<usize>,
    pub max_cap: Vec<usize>,
    pub previous: Option<Vec<Option<usize>>>,
    allowed_mask: Vec<bool>,
    pair_penalty: Vec<f64>,
    soft_min: Vec<usize>,
    soft_max: Vec<usize>,
    capacity_soft_weight: f64,
    hard_capacity: Option<String>,
    hard_pairwise: Vec<&'a Constraint>,
    bands: Vec<Band>,
    previous_known: Vec<bool>,
}

impl<'a> Problem<'a> {
    pub fn build(
        items: &'a [WorkItem],
        workers: &'a [Worker],
        constraints: &'a [Constraint],
        previous: Option<&BTreeMap<String, String>>,
        load_model: &LoadModel,
    ) -> FairshareResult<Self> {
        let mut seen = BTreeSet::new();
        for item in items {
            item.validate()?;
            if !seen.insert(item.id.as_str()) {
                return Err(FairshareError::validation_error(format!(
                    "重复的工作项ID: {}",
                    item.id
                )));
            }
        }
        let mut seen = BTreeSet::new();
        for worker in workers {
            worker.validate()?;
            if !seen.insert(worker.id.as_str()) {
                return Err(FairshareError::validation_error(format!(
                    "重复的Worker ID: {}",
                    worker.id
                )));
            }
        }
        for constraint in constraints {
            constraint.validate()?;
        }

        let mut sorted_items: Vec<&WorkItem> = items.iter().collect();
        sorted_items.sort_by(|a, b| a.id.cmp(&b.id));
        let mut available: Vec<&Worker> = workers.iter().filter(|w| w.is_available()).collect();
        available.sort_by(|a, b| a.id.cmp(&b.id));

        let n = sorted_items.len();
        let m = available.len();

        let hard_capacity = constraints
            .iter()
            .find(|c| c.kind == ConstraintKind::Capacity && c.is_hard())
            .map(|c| c.name.clone());
        let capacity_soft_weight: f64 = constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::Capacity && !c.is_hard())
            .map(|c| c.penalty_weight)
            .sum();
        let (min_cap, max_cap): (Vec<usize>, Vec<usize>) = if hard_capacity.is_some() {
            available
                .iter()
                .map(|w| (w.capacity_min as usize, w.capacity_max as usize))
                .unzip()
        } else {
            (vec![0; m], vec![n; m])
        };

        let pairwise: Vec<&Constraint> = constraints
            .iter()
            .filter(|c| matches!(c.kind, ConstraintKind::Eligibility | ConstraintKind::Regional))
            .collect();
        let hard_pairwise: Vec<&Constraint> =
            pairwise.iter().copied().filter(|c| c.is_hard()).collect();

        let mut allowed = vec![Vec::new(); n];
        let mut allowed_mask = vec![false; n * m];
        let mut pair_penalty = vec![0.0; n * m];
        for (i, item) in sorted_items.iter().enumerate() {
            for (w, worker) in available.iter().enumerate() {
                let mut ok = true;
                for constraint in &pairwise {
                    if pair_allowed(constraint.kind, item, worker) {
                        continue;
                    }
                    if constraint.is_hard() {
                        ok = false;
                    } else {
                        pair_penalty[i * m + w] += constraint.penalty_weight;
                    }
                }
                if ok {
                    allowed[i].push(w);
                    allowed_mask[i * m + w] = true;
                }
            }
        }

        let bands = constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::DifficultyBand)
            .map(|c| Band {
                tolerance: c.band_tolerance(),
                weight: c.penalty_weight,
                hard: c.is_hard(),
            })
            .collect();

        let worker_index: HashMap<&str, usize> = available
            .iter()
            .enumerate()
            .map(|(w, worker)| (worker.id.as_str(), w))
            .collect();
        let previous_known = sorted_items
            .iter()
            .map(|item| previous.is_some_and(|p| p.contains_key(&item.id)))
            .collect();
        let previous = previous.map(|p| {
            sorted_items
                .iter()
                .map(|item| {
                    p.get(&item.id)
                        .and_then(|w| worker_index.get(w.as_str()).copied())
                })
                .collect()
        });

        Ok(Self {
            item_load: sorted_items.iter().map(|i| load_model.item_load(i)).collect(),
            base_load: available.iter().map(|w| load_model.base_load(w)).collect(),
            soft_min: available.iter().map(|w| w.capacity_min as usize).collect(),
            soft_max: available.iter().map(|w| w.capacity_max as usize).collect(),
            items: sorted_items,
            workers: available,
            allowed,
            min_cap,
            max_cap,
            previous,
            allowed_mask,
            pair_penalty,
            capacity_soft_weight,
            hard_capacity,
            hard_pairwise,
            bands,
            previous_known,
        })
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_allowed(&self, item: usize, worker: usize) -> bool {
        self.allowed_mask[item * self.worker_count() + worker]
    }

    fn pair_cost(&self, item: usize, worker: usize) -> f64 {
        self.pair_penalty[item * self.worker_count() + worker]
    }

    fn moved(&self, item: usize, worker: usize) -> usize {
        let stayed = self
            .previous
            .as_ref()
            .is_some_and(|p| p[item] == Some(worker));
        usize::from(self.previous_known[item] && !stayed)
    }

    fn placements(&self, assign: &[usize]) -> BTreeMap<String, String> {
        assign
            .iter()
            .enumerate()
            .map(|(i, w)| (self.items[i].id.clone(), self.workers[*w].id.clone()))
            .collect()
    }

    fn band_excess(loads: &[f64], tolerance: f64) -> f64 {
        if loads.len() < 2 {
            return 0.0;
        }
        let mean = loads.iter().sum::<f64>() / loads.len() as f64;
        if mean <= 0.0 {
            return 0.0;
        }
        loads
            .iter()
            .map(|load| (load - mean).abs() / mean)
            .filter(|deviation| *deviation > tolerance + 1e-12)
            .map(|deviation| deviation - tolerance)
            .sum()
    }

    fn objective(&self, config: &SolverConfig, state: &SearchState) -> f64 {
        let mut penalty = state.pair_penalty;
        let mut hard = 0.0;
        if self.capacity_soft_weight > 0.0 {
            let excess: usize = state
                .counts
                .iter()
                .enumerate()
                .map(|(w, count)| {
                    count.saturating_sub(self.soft_max[w]) + self.soft_min[w].saturating_sub(*count)
                })
                .sum();
            penalty += self.capacity_soft_weight * excess as f64;
        }
        for band in &self.bands {
            let excess = Self::band_excess(&state.loads, band.tolerance);
            if band.hard {
                hard += HARD_BAND_PENALTY * excess;
            } else {
                penalty += band.weight * excess;
            }
        }
        config.gini_weight * gini(&state.loads) + config.penalty_weight * penalty + hard
    }
}

#[derive(Debug, Clone, Copy)]
struct Score {
    objective: f64,
    churn: usize,
}

impl Score {
    fn better_than(&self, other: &Score) -> bool {
        self.objective < other.objective - EPS
            || (self.objective <= other.objective + EPS && self.churn < other.churn)
    }
}

#[derive(Debug, Clone)]
struct SearchState {
    assign: Vec<usize>,
    counts: Vec<usize>,
    loads: Vec<f64>,
    pair_penalty: f64,
    churn: usize,
    score: Score,
}

impl SearchState {
    fn new(problem: &Problem<'_>, config: &SolverConfig, assign: Vec<usize>) -> Self {
        let mut state = Self {
            assign,
            counts: Vec::new(),
            loads: Vec::new(),
            pair_penalty: 0.0,
            churn: 0,
            score: Score {
                objective: 0.0,
                churn: 0,
            },
        };
        state.recompute(problem, config);
        state
    }

    /// 从头重算汇总量，消除增量更新的浮点误差
    fn recompute(&mut self, problem: &Problem<'_>, config: &SolverConfig) {
        self.counts = vec![0; problem.worker_count()];
        self.loads = problem.base_load.clone();
        self.pair_penalty = 0.0;
        self.churn = 0;
        for (i, w) in self.assign.iter().enumerate() {
            self.counts[*w] += 1;
            self.loads[*w] += problem.item_load[i];
            self.pair_penalty += problem.pair_cost(i, *w);
            self.churn += problem.moved(i, *w);
        }
        self.rescore(problem, config);
    }

    fn rescore(&mut self, problem: &Problem<'_>, config: &SolverConfig) {
        self.score = Score {
            objective: problem.objective(config, self),
            churn: self.churn,
        };
    }

    fn relocate(&mut self, problem: &Problem<'_>, item: usize, to: usize) {
        let from = self.assign[item];
        self.counts[from] -= 1;
        self.counts[to] += 1;
        self.loads[from] -= problem.item_load[item];
        self.loads[to] += problem.item_load[item];
        self.pair_penalty += problem.pair_cost(item, to) - problem.pair_cost(item, from);
        self.churn = self.churn + problem.moved(item, to) - problem.moved(item, from);
        self.assign[item] = to;
    }

    fn can_relocate(&self, problem: &Problem<'_>, item: usize, to: usize) -> bool {
        let from = self.assign[item];
        from != to
            && problem.is_allowed(item, to)
            && self.counts[to] < problem.max_cap[to]
            && self.counts[from] > problem.min_cap[from]
    }

    fn can_swap(&self, problem: &Problem<'_>, i: usize, j: usize) -> bool {
        let (a, b) = (self.assign[i], self.assign[j]);
        a != b && problem.is_allowed(i, b) && problem.is_allowed(j, a)
    }

    fn swap(&mut self, problem: &Problem<'_>, i: usize, j: usize) {
        let (a, b) = (self.assign[i], self.assign[j]);
        self.relocate(problem, i, b);
        self.relocate(problem, j, a);
    }
}

struct Candidate {
    placements: BTreeMap<String, String>,
    report: EvaluationReport,
    snapshot: FairnessSnapshot,
    objective: f64,
    churn: usize,
}

impl Candidate {
    fn preferred_over(&self, other: &Candidate) -> bool {
        if self.objective < other.objective - EPS {
            return true;
        }
        if self.objective > other.objective + EPS {
            return false;
        }
        (self.churn, &self.placements) < (other.churn, &other.placements)
    }
}

pub struct AssignmentSolver {
    config: SolverConfig,
    load_model: LoadModel,
}

impl AssignmentSolver {
    pub fn new(config: SolverConfig, load_model: LoadModel) -> Self {
        Self { config, load_model }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn load_model(&self) -> &LoadModel {
        &self.load_model
    }

    /// 求解一个新的基线分配。`cancel` 被置位时尽快返回超时错误。
    pub fn solve(
        &self,
        request: &SolveRequest<'_>,
        cancel: &AtomicBool,
    ) -> FairshareResult<SolveOutcome> {
        let problem = Problem::build(
            request.items,
            request.workers,
            request.constraints,
            request.previous,
            &self.load_model,
        )?;
        debug!(
            "开始求解: {} 个工作项, {} 个可用Worker, {} 条约束",
            problem.item_count(),
            problem.worker_count(),
            request.constraints.len()
        );

        let evaluator = ConstraintEvaluator::new(self.load_model.clone());
        let seeds: Vec<Box<dyn SeedStrategy>> = vec![
            Box::new(MaxFlowSeed),
            Box::new(LeastLoadedSeed),
            Box::new(RoundRobinSeed),
            Box::new(PreviousAssignmentSeed),
        ];

        let mut states: Vec<SearchState> = Vec::new();
        for seed in &seeds {
            check_cancel(cancel)?;
            let preferred = seed.preferred(&problem);
            match flow_assign(&problem, &preferred) {
                Some(assign) => {
                    let mut state = SearchState::new(&problem, &self.config, assign);
                    self.local_search(&problem, &mut state, cancel)?;
                    debug!(
                        "初始方案 {} 搜索完成, 目标值 {:.6}, 变动 {}",
                        seed.name(),
                        state.score.objective,
                        state.churn
                    );
                    states.push(state);
                }
                None => {
                    let binding = diagnose(&problem, request);
                    warn!("硬约束下不存在可行分配: {:?}", binding);
                    return Err(FairshareError::infeasible(binding));
                }
            }
        }

        for restart in 0..self.config.restarts {
            check_cancel(cancel)?;
            let Some(mut state) = states
                .iter()
                .min_by(|a, b| {
                    a.score
                        .objective
                        .total_cmp(&b.score.objective)
                        .then(a.churn.cmp(&b.churn))
                })
                .cloned()
            else {
                break;
            };
            let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(restart as u64));
            perturb(&problem, &mut state, &mut rng);
            state.recompute(&problem, &self.config);
            self.local_search(&problem, &mut state, cancel)?;
            states.push(state);
        }

        let round_robin = round_robin_baseline(request.items, request.workers);
        let round_robin = self.assess(&evaluator, request, round_robin);
        let round_robin_gini = round_robin.snapshot.gini;
        let ceiling = round_robin
            .report
            .is_feasible()
            .then_some(round_robin_gini + EPS);

        let mut seen = BTreeSet::new();
        let mut candidates = Vec::new();
        for state in &states {
            let placements = problem.placements(&state.assign);
            if seen.insert(placements.clone()) {
                candidates.push(self.assess(&evaluator, request, placements));
            }
        }
        if seen.insert(round_robin.placements.clone()) {
            candidates.push(round_robin);
        }
        let candidates_evaluated = candidates.len();

        let mut best: Option<&Candidate> = None;
        for candidate in &candidates {
            if !candidate.report.is_feasible() {
                continue;
            }
            if ceiling.is_some_and(|limit| candidate.snapshot.gini > limit) {
                continue;
            }
            if best.map_or(true, |current| candidate.preferred_over(current)) {
                best = Some(candidate);
            }
        }

        let Some(best) = best else {
            let binding = binding_from_reports(&candidates);
            warn!("所有候选方案均违反硬约束: {:?}", binding);
            return Err(FairshareError::infeasible(binding));
        };

        info!(
            "求解完成: {} 个工作项, Gini {:.4} (轮询基线 {:.4}), 目标值 {:.6}, 变动 {}, 候选 {}",
            best.placements.len(),
            best.snapshot.gini,
            round_robin_gini,
            best.objective,
            best.churn,
            candidates_evaluated
        );

        Ok(SolveOutcome {
            placements: best.placements.clone(),
            snapshot: best.snapshot.clone(),
            report: best.report.clone(),
            objective: best.objective,
            churn: best.churn,
            round_robin_gini,
            candidates_evaluated,
        })
    }

    fn assess(
        &self,
        evaluator: &ConstraintEvaluator,
        request: &SolveRequest<'_>,
        placements: BTreeMap<String, String>,
    ) -> Candidate {
        let report = evaluator.evaluate(
            &CandidateAssignment {
                placements: &placements,
                items: request.items,
                workers: request.workers,
            },
            request.constraints,
            &EvaluationScope::All,
        );
        let snapshot =
            self.load_model
                .snapshot_of(&placements, &index_items(request.items), request.workers);
        let objective =
            self.config.gini_weight * snapshot.gini + self.config.penalty_weight * report.penalty_total;
        let churn = request.previous.map_or(0, |previous| {
            previous
                .iter()
                .filter(|(item, worker)| {
                    placements.get(*item).is_some_and(|now| now != *worker)
                })
                .count()
        });
        Candidate {
            placements,
            report,
            snapshot,
            objective,
            churn,
        }
    }

    fn local_search(
        &self,
        problem: &Problem<'_>,
        state: &mut SearchState,
        cancel: &AtomicBool,
    ) -> FairshareResult<()> {
        let n = problem.item_count();
        for _ in 0..self.config.max_iterations {
            check_cancel(cancel)?;
            let mut improved = false;

            for item in 0..n {
                for k in 0..problem.allowed[item].len() {
                    let to = problem.allowed[item][k];
                    if !state.can_relocate(problem, item, to) {
                        continue;
                    }
                    let from = state.assign[item];
                    let current = state.score;
                    state.relocate(problem, item, to);
                    state.rescore(problem, &self.config);
                    if state.score.better_than(&current) {
                        improved = true;
                    } else {
                        state.relocate(problem, item, from);
                        state.score = current;
                    }
                }
            }

            for i in 0..n {
                if i % 64 == 0 {
                    check_cancel(cancel)?;
                }
                for j in (i + 1)..n {
                    if !state.can_swap(problem, i, j) {
                        continue;
                    }
                    let current = state.score;
                    state.swap(problem, i, j);
                    state.rescore(problem, &self.config);
                    if state.score.better_than(&current) {
                        improved = true;
                    } else {
                        state.swap(problem, i, j);
                        state.score = current;
                    }
                }
            }

            state.recompute(problem, &self.config);
            if !improved {
                break;
            }
        }
        Ok(())
    }
}

fn check_cancel(cancel: &AtomicBool) -> FairshareResult<()> {
    if cancel.load(Ordering::Relaxed) {
        return Err(FairshareError::timeout("求解已被取消"));
    }
    Ok(())
}

/// 随机迁移或互换若干工作项，始终保持硬约束可行
fn perturb(problem: &Problem<'_>, state: &mut SearchState, rng: &mut StdRng) {
    let n = problem.item_count();
    if n == 0 || problem.worker_count() < 2 {
        return;
    }
    let moves = (n / 10).max(1);
    for _ in 0..moves {
        let item = rng.random_range(0..n);
        let options = &problem.allowed[item];
        if options.is_empty() {
            continue;
        }
        let to = options[rng.random_range(0..options.len())];
        if state.can_relocate(problem, item, to) {
            state.relocate(problem, item, to);
            continue;
        }
        let other = rng.random_range(0..n);
        if state.can_swap(problem, item, other) {
            state.swap(problem, item, other);
        }
    }
}

/// 残量网络，边成对存放，`e ^ 1` 为反向边
struct FlowNetwork {
    graph: Vec<Vec<usize>>,
    to: Vec<usize>,
    cap: Vec<usize>,
}

impl FlowNetwork {
    fn new(nodes: usize) -> Self {
        Self {
            graph: vec![Vec::new(); nodes],
            to: Vec::new(),
            cap: Vec::new(),
        }
    }

    fn add_edge(&mut self, from: usize, to: usize, cap: usize) -> usize {
        let edge = self.to.len();
        self.graph[from].push(edge);
        self.to.push(to);
        self.cap.push(cap);
        self.graph[to].push(edge + 1);
        self.to.push(from);
        self.cap.push(0);
        edge
    }

    fn push(&mut self, edges: &[usize]) -> bool {
        if edges.iter().any(|e| self.cap[*e] == 0) {
            return false;
        }
        for e in edges {
            self.cap[*e] -= 1;
            self.cap[*e ^ 1] += 1;
        }
        true
    }

    /// 广度优先找一条增广路径并推送一个单位流量
    fn augment(&mut self, source: usize, sink: usize) -> bool {
        let mut parent: Vec<Option<usize>> = vec![None; self.graph.len()];
        let mut visited = vec![false; self.graph.len()];
        let mut queue = std::collections::VecDeque::new();
        visited[source] = true;
        queue.push_back(source);
        while let Some(node) = queue.pop_front() {
            if node == sink {
                break;
            }
            for &edge in &self.graph[node] {
                let next = self.to[edge];
                if self.cap[edge] > 0 && !visited[next] {
                    visited[next] = true;
                    parent[next] = Some(edge);
                    queue.push_back(next);
                }
            }
        }
        if !visited[sink] {
            return false;
        }
        let mut node = sink;
        while let Some(edge) = parent[node] {
            self.cap[edge] -= 1;
            self.cap[edge ^ 1] += 1;
            node = self.to[edge ^ 1];
        }
        true
    }
}

/// 在硬约束下求一个完整分配，尽量保留 `preferred` 中的归属。
///
/// 先只开放容量下限，保证每个Worker的下限被满足，再开放到上限。
fn flow_assign(problem: &Problem<'_>, preferred: &[Option<usize>]) -> Option<Vec<usize>> {
    let n = problem.item_count();
    let m = problem.worker_count();
    let source = 0;
    let sink = n + m + 1;
    let mut network = FlowNetwork::new(n + m + 2);

    let source_edges: Vec<usize> = (0..n).map(|i| network.add_edge(source, 1 + i, 1)).collect();
    let item_edges: Vec<Vec<(usize, usize)>> = (0..n)
        .map(|i| {
            problem.allowed[i]
                .iter()
                .map(|w| (*w, network.add_edge(1 + i, 1 + n + w, 1)))
                .collect()
        })
        .collect();
    let sink_edges: Vec<usize> = (0..m)
        .map(|w| network.add_edge(1 + n + w, sink, problem.min_cap[w]))
        .collect();

    let push_preferred = |network: &mut FlowNetwork| -> usize {
        let mut pushed = 0;
        for i in 0..n {
            let Some(w) = preferred.get(i).copied().flatten() else {
                continue;
            };
            let Some((_, edge)) = item_edges[i].iter().find(|(worker, _)| *worker == w) else {
                continue;
            };
            if network.push(&[source_edges[i], *edge, sink_edges[w]]) {
                pushed += 1;
            }
        }
        pushed
    };

    let mut flow = push_preferred(&mut network);
    while network.augment(source, sink) {
        flow += 1;
    }
    let required: usize = problem.min_cap.iter().sum();
    if flow < required {
        return None;
    }

    for w in 0..m {
        network.cap[sink_edges[w]] += problem.max_cap[w] - problem.min_cap[w];
    }
    flow += push_preferred(&mut network);
    while network.augment(source, sink) {
        flow += 1;
    }
    if flow < n {
        return None;
    }

    (0..n)
        .map(|i| {
            item_edges[i]
                .iter()
                .find(|(_, edge)| network.cap[*edge] == 0)
                .map(|(w, _)| *w)
        })
        .collect()
}

fn preview(ids: &[String]) -> String {
    const LIMIT: usize = 5;
    if ids.len() <= LIMIT {
        ids.join(", ")
    } else {
        format!("{} 等 {} 个", ids[..LIMIT].join(", "), ids.len())
    }
}

/// 找出导致不可行的约束
fn diagnose(problem: &Problem<'_>, request: &SolveRequest<'_>) -> Vec<BindingConstraint> {
    let n = problem.item_count();
    let mut binding = Vec::new();

    if problem.worker_count() == 0 && n > 0 {
        binding.push(BindingConstraint::new(
            "availability",
            ConstraintKind::Availability.as_str(),
            format!("没有可用的Worker承接 {n} 个工作项"),
        ));
        return binding;
    }

    if let Some(name) = &problem.hard_capacity {
        let total_max: usize = problem.max_cap.iter().sum();
        let total_min: usize = problem.min_cap.iter().sum();
        if total_max < n {
            binding.push(BindingConstraint::new(
                name,
                ConstraintKind::Capacity.as_str(),
                format!("可用Worker容量上限之和 {total_max} 小于工作项数 {n}"),
            ));
        }
        if total_min > n {
            binding.push(BindingConstraint::new(
                name,
                ConstraintKind::Capacity.as_str(),
                format!("可用Worker容量下限之和 {total_min} 大于工作项数 {n}"),
            ));
        }
    }

    let mut stranded: BTreeMap<(String, &'static str), Vec<String>> = BTreeMap::new();
    for (i, item) in problem.items.iter().enumerate() {
        if !problem.allowed[i].is_empty() {
            continue;
        }
        let mut blamed = false;
        for constraint in &problem.hard_pairwise {
            if !request
                .workers
                .iter()
                .any(|w| pair_allowed(constraint.kind, item, w))
            {
                stranded
                    .entry((constraint.name.clone(), constraint.kind.as_str()))
                    .or_default()
                    .push(item.id.clone());
                blamed = true;
            }
        }
        if blamed {
            continue;
        }
        let fits_suspended = request.workers.iter().any(|w| {
            problem
                .hard_pairwise
                .iter()
                .all(|c| pair_allowed(c.kind, item, w))
        });
        if fits_suspended {
            stranded
                .entry(("availability".to_string(), ConstraintKind::Availability.as_str()))
                .or_default()
                .push(item.id.clone());
        } else {
            for constraint in &problem.hard_pairwise {
                stranded
                    .entry((constraint.name.clone(), constraint.kind.as_str()))
                    .or_default()
                    .push(item.id.clone());
            }
        }
    }
    for ((name, kind), ids) in stranded {
        binding.push(BindingConstraint::new(
            name,
            kind,
            format!("工作项 {} 没有满足条件的可用Worker", preview(&ids)),
        ));
    }

    if binding.is_empty() {
        let detail = "受资质/区域限制的工作项超出了可承接它们的Worker容量";
        if let Some(name) = &problem.hard_capacity {
            binding.push(BindingConstraint::new(
                name,
                ConstraintKind::Capacity.as_str(),
                detail,
            ));
        }
        for constraint in &problem.hard_pairwise {
            binding.push(BindingConstraint::new(
                &constraint.name,
                constraint.kind.as_str(),
                detail,
            ));
        }
    }
    if binding.is_empty() {
        binding.push(BindingConstraint::new(
            "coverage",
            ConstraintKind::Coverage.as_str(),
            "无法为所有工作项找到Worker",
        ));
    }
    binding
}

/// 候选方案都可行于流模型但被评估器否决时（如硬难度带），取目标值最小者的硬违反
fn binding_from_reports(candidates: &[Candidate]) -> Vec<BindingConstraint> {
    let Some(closest) = candidates
        .iter()
        .min_by(|a, b| a.objective.total_cmp(&b.objective))
    else {
        return vec![BindingConstraint::new(
            "coverage",
            ConstraintKind::Coverage.as_str(),
            "没有候选方案",
        )];
    };
    let mut seen = BTreeSet::new();
    closest
        .report
        .hard_violations()
        .filter(|v| seen.insert(v.constraint.clone()))
        .map(|v| BindingConstraint::new(&v.constraint, v.kind.as_str(), &v.detail))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairshare_domain::Availability;

    fn solver() -> AssignmentSolver {
        AssignmentSolver::new(SolverConfig::default(), LoadModel::default())
    }

    fn item(id: &str, difficulty: f64) -> WorkItem {
        WorkItem::new(id, difficulty, 60, "north")
    }

    fn solve(
        items: &[WorkItem],
        workers: &[Worker],
        constraints: &[Constraint],
        previous: Option<&BTreeMap<String, String>>,
    ) -> FairshareResult<SolveOutcome> {
        let request = SolveRequest {
            items,
            workers,
            constraints,
            previous,
        };
        solver().solve(&request, &AtomicBool::new(false))
    }

    fn binding_names(err: &FairshareError) -> Vec<String> {
        err.binding_constraints()
            .unwrap_or_default()
            .iter()
            .map(|b| b.name.clone())
            .collect()
    }

    #[test]
    fn test_solver_balances_two_workers() {
        let items = vec![item("r-1", 90.0), item("r-2", 10.0), item("r-3", 50.0), item("r-4", 50.0)];
        let workers = vec![Worker::new("a", 0, 4), Worker::new("b", 0, 4)];
        let outcome = solve(&items, &workers, &Constraint::default_set(), None).unwrap();

        assert!(outcome.snapshot.gini.abs() < 1e-12);
        assert_eq!(outcome.placements["r-1"], "a");
        assert_eq!(outcome.placements["r-2"], "a");
        assert_eq!(outcome.placements["r-3"], "b");
        assert_eq!(outcome.placements["r-4"], "b");
        assert!(outcome.report.is_feasible());
    }

    #[test]
    fn test_solver_is_deterministic() {
        let items: Vec<WorkItem> = (0..23)
            .map(|i| item(&format!("r-{i:02}"), ((i * 37) % 97) as f64))
            .collect();
        let workers: Vec<Worker> = (0..5).map(|i| Worker::new(format!("w-{i}"), 2, 8)).collect();
        let first = solve(&items, &workers, &Constraint::default_set(), None).unwrap();
        let second = solve(&items, &workers, &Constraint::default_set(), None).unwrap();
        assert_eq!(first.placements, second.placements);
        assert_eq!(first.objective, second.objective);
    }

    #[test]
    fn test_solver_never_worse_than_round_robin() {
        let items: Vec<WorkItem> = (0..17)
            .map(|i| item(&format!("r-{i:02}"), ((i * 53) % 89 + 5) as f64))
            .collect();
        let workers: Vec<Worker> = (0..4).map(|i| Worker::new(format!("w-{i}"), 0, 10)).collect();
        let outcome = solve(&items, &workers, &Constraint::default_set(), None).unwrap();
        assert!(outcome.snapshot.gini <= outcome.round_robin_gini + 1e-9);
    }

    #[test]
    fn test_capacity_shortfall_is_infeasible() {
        let items: Vec<WorkItem> = (0..7).map(|i| item(&format!("r-{i}"), 10.0)).collect();
        let workers: Vec<Worker> = (0..3).map(|i| Worker::new(format!("w-{i}"), 0, 2)).collect();
        let err = solve(&items, &workers, &Constraint::default_set(), None).unwrap_err();
        assert!(matches!(err, FairshareError::Infeasible { .. }));
        assert!(binding_names(&err).contains(&"capacity".to_string()));
    }

    #[test]
    fn test_soft_capacity_allows_overflow() {
        let items: Vec<WorkItem> = (0..7).map(|i| item(&format!("r-{i}"), 10.0)).collect();
        let workers: Vec<Worker> = (0..3).map(|i| Worker::new(format!("w-{i}"), 0, 2)).collect();
        let constraints = vec![
            Constraint::capacity().soft(1.0),
            Constraint::eligibility(),
            Constraint::regional(),
        ];
        let outcome = solve(&items, &workers, &constraints, None).unwrap();
        assert_eq!(outcome.placements.len(), 7);
        assert_eq!(outcome.report.soft_violations().count(), 1);
    }

    #[test]
    fn test_missing_qualification_names_eligibility() {
        let items = vec![item("r-1", 10.0).with_tags(["hazmat"]), item("r-2", 10.0)];
        let workers = vec![Worker::new("a", 0, 5), Worker::new("b", 0, 5)];
        let err = solve(&items, &workers, &Constraint::default_set(), None).unwrap_err();
        assert_eq!(binding_names(&err), vec!["eligibility".to_string()]);
    }

    #[test]
    fn test_only_suspended_holder_names_availability() {
        let items = vec![item("r-1", 10.0).with_tags(["hazmat"])];
        let mut qualified = Worker::new("a", 0, 5).with_tags(["hazmat"]);
        qualified.availability = Availability::Suspended;
        let workers = vec![qualified, Worker::new("b", 0, 5)];
        let err = solve(&items, &workers, &Constraint::default_set(), None).unwrap_err();
        assert_eq!(binding_names(&err), vec!["availability".to_string()]);
    }

    #[test]
    fn test_suspended_workers_receive_nothing() {
        let items: Vec<WorkItem> = (0..6).map(|i| item(&format!("r-{i}"), 20.0)).collect();
        let mut suspended = Worker::new("c", 0, 6);
        suspended.availability = Availability::Suspended;
        let workers = vec![Worker::new("a", 0, 6), Worker::new("b", 0, 6), suspended];
        let outcome = solve(&items, &workers, &Constraint::default_set(), None).unwrap();
        assert!(outcome.placements.values().all(|w| w != "c"));
        assert!(!outcome.snapshot.per_worker_load.contains_key("c"));
    }

    #[test]
    fn test_prefers_previous_assignment_among_equal_optima() {
        let items: Vec<WorkItem> = (1..=4).map(|i| item(&format!("r-{i}"), 10.0)).collect();
        let workers = vec![Worker::new("a", 0, 4), Worker::new("b", 0, 4)];
        let previous: BTreeMap<String, String> =
            [("r-1", "a"), ("r-2", "b"), ("r-3", "b"), ("r-4", "a")]
                .into_iter()
                .map(|(i, w)| (i.to_string(), w.to_string()))
                .collect();
        let outcome = solve(&items, &workers, &Constraint::default_set(), Some(&previous)).unwrap();
        assert_eq!(outcome.churn, 0);
        assert_eq!(outcome.placements, previous);
    }

    #[test]
    fn test_respects_capacity_minimum() {
        let items: Vec<WorkItem> = (0..6).map(|i| item(&format!("r-{i}"), 10.0)).collect();
        let workers = vec![Worker::new("a", 0, 6), Worker::new("b", 5, 6)];
        let outcome = solve(&items, &workers, &Constraint::default_set(), None).unwrap();
        let counts = outcome.placements.values().filter(|w| *w == "b").count();
        assert!(counts >= 5);
    }

    #[test]
    fn test_cancelled_solve_times_out() {
        let items = vec![item("r-1", 10.0)];
        let workers = vec![Worker::new("a", 0, 5)];
        let request = SolveRequest {
            items: &items,
            workers: &workers,
            constraints: &[],
            previous: None,
        };
        let err = solver().solve(&request, &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, FairshareError::Timeout(_)));
    }

    #[test]
    fn test_empty_instance_is_trivially_feasible() {
        let workers = vec![Worker::new("a", 0, 5), Worker::new("b", 0, 5)];
        let outcome = solve(&[], &workers, &Constraint::default_set(), None).unwrap();
        assert!(outcome.placements.is_empty());
        assert_eq!(outcome.snapshot.gini, 0.0);
    }

    #[test]
    fn test_duplicate_item_ids_rejected() {
        let items = vec![item("r-1", 10.0), item("r-1", 20.0)];
        let workers = vec![Worker::new("a", 0, 5)];
        let err = solve(&items, &workers, &[], None).unwrap_err();
        assert!(matches!(err, FairshareError::ValidationError(_)));
    }

    const ZONES: [&str; 3] = ["north", "south", "east"];

    fn random_instance(rng: &mut StdRng) -> (Vec<WorkItem>, Vec<Worker>) {
        let worker_count = rng.random_range(2..=6);
        let mut workers = vec![Worker::new("w-0", 0, 40).with_tags(["hazmat"])];
        for i in 1..worker_count {
            let min = rng.random_range(0..=1);
            let max = rng.random_range(min.max(2)..=8);
            let mut worker = Worker::new(format!("w-{i}"), min, max);
            if rng.random_bool(0.5) {
                let first = ZONES[rng.random_range(0..ZONES.len())];
                let second = ZONES[rng.random_range(0..ZONES.len())];
                worker = worker.with_zones([first, second]);
            }
            if rng.random_bool(0.3) {
                worker = worker.with_tags(["hazmat"]);
            }
            if rng.random_bool(0.15) {
                worker.availability = Availability::Suspended;
            }
            workers.push(worker);
        }

        let item_count = rng.random_range(6..=20);
        let items = (0..item_count)
            .map(|i| {
                let difficulty = rng.random_range(1.0..100.0);
                let zone = ZONES[rng.random_range(0..ZONES.len())];
                let item = WorkItem::new(format!("r-{i:02}"), difficulty, 60, zone);
                if rng.random_bool(0.2) {
                    item.with_tags(["hazmat"])
                } else {
                    item
                }
            })
            .collect();
        (items, workers)
    }

    fn assert_hard_constraints(
        placements: &BTreeMap<String, String>,
        items: &[WorkItem],
        workers: &[Worker],
    ) {
        assert_eq!(placements.len(), items.len());
        for item in items {
            let worker_id = placements
                .get(&item.id)
                .unwrap_or_else(|| panic!("{} 未分配", item.id));
            let worker = workers.iter().find(|w| &w.id == worker_id).unwrap();
            assert!(worker.is_available(), "{} 分给了不可用的 {}", item.id, worker.id);
            assert!(worker.has_tags_for(item), "{} 缺少资质 {}", worker.id, item.id);
            assert!(worker.serves_zone(&item.zone), "{} 不服务区域 {}", worker.id, item.zone);
        }
        for worker in workers.iter().filter(|w| w.is_available()) {
            let count = placements.values().filter(|id| **id == worker.id).count();
            assert!(
                worker.within_capacity(count),
                "{} 分到 {} 个, 容量 [{}, {}]",
                worker.id,
                count,
                worker.capacity_min,
                worker.capacity_max
            );
        }
    }

    #[test]
    fn test_random_instances_keep_hard_constraints_and_beat_round_robin() {
        use rand::seq::SliceRandom;

        let constraints = Constraint::default_set();
        let evaluator = ConstraintEvaluator::new(LoadModel::default());
        let mut solved = 0;
        let mut compared = 0;

        for seed in 0..60u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (items, workers) = random_instance(&mut rng);
            let outcome = match solve(&items, &workers, &constraints, None) {
                Ok(outcome) => outcome,
                Err(FairshareError::Infeasible { .. }) => continue,
                Err(other) => panic!("seed {seed}: {other}"),
            };
            solved += 1;
            assert_hard_constraints(&outcome.placements, &items, &workers);

            let request = SolveRequest {
                items: &items,
                workers: &workers,
                constraints: &constraints,
                previous: None,
            };
            let round_robin =
                solver().assess(&evaluator, &request, round_robin_baseline(&items, &workers));
            if round_robin.report.is_feasible() {
                compared += 1;
                assert!(
                    outcome.snapshot.gini <= round_robin.snapshot.gini + EPS,
                    "seed {seed}: gini {} > 轮询 {}",
                    outcome.snapshot.gini,
                    round_robin.snapshot.gini
                );
            }

            let mut shuffled_items = items.clone();
            let mut shuffled_workers = workers.clone();
            shuffled_items.shuffle(&mut rng);
            shuffled_workers.shuffle(&mut rng);
            let reordered = solve(&shuffled_items, &shuffled_workers, &constraints, None)
                .unwrap_or_else(|e| panic!("seed {seed}: 打乱顺序后求解失败: {e}"));
            assert_eq!(reordered.placements, outcome.placements, "seed {seed}");
        }

        assert!(solved >= 30, "仅 {solved} 个随机实例可解");
        assert!(compared > 0);
    }
}
