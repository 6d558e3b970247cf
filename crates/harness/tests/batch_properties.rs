//! Randomized checks of the batch invariants: ordering, no double
//! processing, idempotent resumption, at most one pending conflict, and
//! omitted inputs never counting as success or failure.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hivelog_core::HiveId;
use hivelog_engine::{BatchPhase, BatchSummary, Decision, ReportingConfig, RunOutcome};
use hivelog_harness::{FaultOp, StoreCall, TestApiary, TestSession};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const YEAR: i64 = 2025;
const WEEK: i64 = 18;

#[derive(Debug, Clone)]
struct HivePlan {
    name: String,
    input: Option<u32>,
    existing: Option<u32>,
    list_fails: bool,
    create_fails: bool,
    update_fails: bool,
    decision: Decision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expected {
    Absent,
    Succeeded,
    Failed,
    Skipped,
}

impl HivePlan {
    fn random(rng: &mut StdRng, index: usize) -> Self {
        Self {
            name: format!("H{index}"),
            input: rng.gen_bool(0.75).then(|| rng.gen_range(0..200)),
            existing: rng.gen_bool(0.4).then(|| rng.gen_range(0..200)),
            list_fails: rng.gen_bool(0.1),
            create_fails: rng.gen_bool(0.15),
            update_fails: rng.gen_bool(0.15),
            decision: if rng.gen_bool(0.5) {
                Decision::Overwrite
            } else {
                Decision::Skip
            },
        }
    }

    fn expected(&self) -> Expected {
        if self.input.is_none() {
            return Expected::Absent;
        }
        if self.list_fails {
            return Expected::Failed;
        }
        match (self.existing, self.decision) {
            (Some(_), Decision::Skip) => Expected::Skipped,
            (Some(_), Decision::Overwrite) if self.update_fails => Expected::Failed,
            (Some(_), Decision::Overwrite) => Expected::Succeeded,
            (None, _) if self.create_fails => Expected::Failed,
            (None, _) => Expected::Succeeded,
        }
    }

    fn stored_after(&self) -> Option<u32> {
        match self.expected() {
            Expected::Succeeded => self.input,
            _ => self.existing,
        }
    }
}

fn build(plans: &[HivePlan]) -> Result<TestSession, Box<dyn std::error::Error>> {
    let names: Vec<&str> = plans.iter().map(|p| p.name.as_str()).collect();
    let mut apiary = TestApiary::with_hives(&names)?;
    for plan in plans {
        if let Some(existing) = plan.existing {
            apiary.seed_report(&plan.name, YEAR, WEEK, existing)?;
        }
    }
    let mut t = apiary.start_session(ReportingConfig::default());
    for plan in plans {
        let hive_id = t.hive_id(&plan.name);
        if plan.list_fails {
            t.store_mut().fail(FaultOp::ListReports, hive_id, "timeout");
        }
        if plan.create_fails {
            t.store_mut().fail(FaultOp::Create, hive_id, "connection reset");
        }
        if plan.update_fails {
            t.store_mut().fail(FaultOp::Update, hive_id, "502 bad gateway");
        }
    }
    t.session.select_apiary(t.apiary_id())?;
    t.session.select_period(YEAR, WEEK)?;
    for plan in plans {
        if let Some(input) = plan.input {
            let hive_id = t.hive_id(&plan.name);
            t.session.set_count(hive_id, Some(i64::from(input)))?;
        }
    }
    Ok(t)
}

/// Drive the batch to completion, interleaving spurious `run()` calls.
fn drive(
    t: &mut TestSession,
    plans: &[HivePlan],
    rng: &mut StdRng,
) -> Result<BatchSummary, Box<dyn std::error::Error>> {
    let by_hive: HashMap<HiveId, &HivePlan> =
        plans.iter().map(|p| (t.hive_id(&p.name), p)).collect();
    let mut outcome = t.session.submit()?;
    loop {
        match outcome {
            RunOutcome::Completed(summary) => return Ok(summary),
            RunOutcome::Inactive => return Err("batch went inactive before completing".into()),
            RunOutcome::Suspended(conflict) => {
                assert!(matches!(t.session.phase(), BatchPhase::Suspended { .. }));
                assert_eq!(t.session.pending_conflict(), Some(&conflict));

                let plan = by_hive[&conflict.hive_id];
                assert!(plan.existing.is_some(), "conflict on a hive without a report");
                assert_eq!(conflict.existing, plan.existing.map(hivelog_core::MiteCount::new));

                let calls_before = t.store().call_count();
                for _ in 0..rng.gen_range(0..3) {
                    let again = t.session.run();
                    assert_eq!(again, RunOutcome::Suspended(conflict.clone()));
                }
                assert_eq!(t.store().call_count(), calls_before);

                outcome = t.session.resolve_conflict(plan.decision)?;
            }
        }
    }
}

fn check_scenario(seed: u64) -> TestResult {
    let mut rng = StdRng::seed_from_u64(seed);
    let hive_count = rng.gen_range(0..8);
    let plans: Vec<HivePlan> = (0..hive_count)
        .map(|i| HivePlan::random(&mut rng, i))
        .collect();
    let mut t = build(&plans)?;
    t.store().clear_calls();

    let summary = drive(&mut t, &plans, &mut rng)?;

    // Outcome of every hive matches the plan, and summary lists keep target order.
    let ids: Vec<HiveId> = plans.iter().map(|p| t.hive_id(&p.name)).collect();
    let pick = |wanted: Expected| -> Vec<HiveId> {
        plans
            .iter()
            .zip(&ids)
            .filter(|(p, _)| p.expected() == wanted)
            .map(|(_, id)| *id)
            .collect()
    };
    assert_eq!(summary.succeeded, pick(Expected::Succeeded), "seed {seed}");
    assert_eq!(summary.failed_hives(), pick(Expected::Failed), "seed {seed}");
    assert_eq!(summary.skipped, pick(Expected::Skipped), "seed {seed}");
    assert_eq!(summary.is_success(), pick(Expected::Failed).is_empty());

    // Store calls touch hives in target order, each hive in one contiguous run.
    let calls = t.store().calls();
    let index_of: HashMap<HiveId, usize> =
        ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let touched: Vec<usize> = calls
        .iter()
        .filter_map(|c| c.hive_id())
        .map(|id| index_of[&id])
        .collect();
    assert!(
        touched.windows(2).all(|w| w[0] <= w[1]),
        "seed {seed}: out-of-order calls {calls:?}"
    );

    for (plan, id) in plans.iter().zip(&ids) {
        let mine = t.store().calls_for(*id);
        let lists = mine.iter().filter(|c| matches!(c, StoreCall::ListReports(_))).count();
        let creates = mine.iter().filter(|c| matches!(c, StoreCall::Create(_))).count();
        let updates = mine.iter().filter(|c| matches!(c, StoreCall::Update(_))).count();
        if plan.input.is_none() {
            assert!(mine.is_empty(), "seed {seed}: excluded hive was touched");
            continue;
        }
        assert_eq!(lists, 1, "seed {seed}: {mine:?}");
        assert!(creates <= 1 && updates <= 1, "seed {seed}: {mine:?}");
        assert!(creates + updates <= 1, "seed {seed}: {mine:?}");
        assert_eq!(
            t.stored_count(&plan.name, YEAR, WEEK),
            plan.stored_after(),
            "seed {seed}: stored value for {}",
            plan.name
        );
    }

    // Further runs after completion are free.
    let calls_before = t.store().call_count();
    for _ in 0..rng.gen_range(1..4) {
        assert_eq!(t.session.run(), RunOutcome::Inactive);
    }
    assert_eq!(t.store().call_count(), calls_before);
    Ok(())
}

#[test]
fn random_batches_hold_invariants() -> TestResult {
    for seed in 0..200 {
        check_scenario(seed)?;
    }
    Ok(())
}

#[test]
fn hives_without_input_never_reach_the_summary() -> TestResult {
    let mut rng = StdRng::seed_from_u64(7);
    let plans: Vec<HivePlan> = (0..6)
        .map(|i| HivePlan {
            input: (i % 2 == 0).then_some(i as u32),
            ..HivePlan::random(&mut rng, i)
        })
        .collect();
    let mut t = build(&plans)?;
    let summary = drive(&mut t, &plans, &mut rng)?;
    for plan in plans.iter().filter(|p| p.input.is_none()) {
        let id = t.hive_id(&plan.name);
        assert!(!summary.succeeded.contains(&id));
        assert!(!summary.failed_hives().contains(&id));
        assert!(!summary.skipped.contains(&id));
    }
    Ok(())
}
