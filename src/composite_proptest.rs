//! Property-based tests for the composite scheduler and proxy leasing.
//!
//! Random operation lists, outcomes and dependency edges are generated and the
//! scheduler's ordering, gating and containment guarantees are checked for
//! every one of them.

#[cfg(test)]
mod proptest_tests {
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;

    use crate::composite::{CompositeOperation, OperationHandle, SkipReason};
    use crate::memory::{FailureKind, FailureRule};
    use crate::operation::Operation;
    use crate::operations::{CleanupOperation, WorkingCopy};
    use crate::progress::{CancellationFlag, NullProgress};
    use crate::status::ExecutionState;
    use crate::testing::{memory_location, RecordingProgress, ScriptedAction, StepOutcome};

    fn outcome() -> impl Strategy<Value = StepOutcome> {
        prop_oneof![
            4 => Just(StepOutcome::Ok),
            1 => Just(StepOutcome::Warn),
            2 => Just(StepOutcome::Fail),
            1 => Just(StepOutcome::Panic),
        ]
    }

    /// Per operation: its step outcomes and a bitmask of earlier operations
    /// it depends on.
    fn operations() -> impl Strategy<Value = Vec<(Vec<StepOutcome>, u32)>> {
        prop::collection::vec((prop::collection::vec(outcome(), 0..4), any::<u32>()), 1..8)
    }

    fn scripted(name: &str, outcomes: &[StepOutcome], log: &Arc<Mutex<Vec<String>>>) -> ScriptedAction {
        let resources: Vec<String> = (0..outcomes.len()).map(|i| format!("{}/{}", name, i)).collect();
        let steps: Vec<(&str, StepOutcome)> = resources
            .iter()
            .map(String::as_str)
            .zip(outcomes.iter().copied())
            .collect();
        ScriptedAction::new(&steps).logging_to(log.clone(), name)
    }

    proptest! {
        /// Property: without dependencies every operation runs once, in order,
        /// whatever the outcomes.
        #[test]
        fn independent_operations_all_run_in_order(ops in operations()) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let mut composite = CompositeOperation::new("prop");
            let mut names = Vec::new();
            for (index, (outcomes, _)) in ops.iter().enumerate() {
                let name = format!("op{}", index);
                composite.add_action(scripted(&name, outcomes, &log));
                names.push(name);
            }

            composite.run(&NullProgress::new());

            prop_assert_eq!(log.lock().unwrap().clone(), names);
            prop_assert!(composite.operations().all(|op| op.execution_state().is_terminal()));
        }

        /// Property: an operation whose dependency did not end ok never runs,
        /// and one whose dependencies all ended ok always does.
        #[test]
        fn dependency_gate_holds(ops in operations()) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let mut composite = CompositeOperation::new("prop");
            let mut handles: Vec<OperationHandle> = Vec::new();
            let mut edges: Vec<Vec<usize>> = Vec::new();
            for (index, (outcomes, mask)) in ops.iter().enumerate() {
                let deps: Vec<usize> = (0..index).filter(|d| mask & (1 << d) != 0).collect();
                let dep_handles: Vec<_> = deps.iter().map(|d| handles[*d]).collect();
                let action = scripted(&format!("op{}", index), outcomes, &log);
                let handle = composite
                    .add_with_dependencies(Operation::new(action), &dep_handles)
                    .unwrap();
                handles.push(handle);
                edges.push(deps);
            }

            composite.run(&NullProgress::new());

            for (index, deps) in edges.iter().enumerate() {
                let all_ok = deps.iter().all(|d| {
                    composite.operation(handles[*d]).unwrap().execution_state() == ExecutionState::Ok
                });
                let op = composite.operation(handles[index]).unwrap();
                if all_ok {
                    prop_assert!(op.execution_state().is_terminal());
                    prop_assert_eq!(composite.skipped(handles[index]), None);
                } else {
                    prop_assert_eq!(op.execution_state(), ExecutionState::NotExecuted);
                    prop_assert_eq!(composite.skipped(handles[index]), Some(SkipReason::Dependency));
                }
            }
        }

        /// Property: k failing steps out of n give n attempts and k containers.
        #[test]
        fn failures_are_contained_per_step(outcomes in prop::collection::vec(outcome(), 1..12)) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let mut op = Operation::new(scripted("op", &outcomes, &log));
            let state = op.run(&NullProgress::new());

            let failing = outcomes
                .iter()
                .filter(|o| matches!(o, StepOutcome::Fail | StepOutcome::Panic))
                .count();
            let action = op.action::<ScriptedAction>().unwrap();
            prop_assert_eq!(action.attempted().len(), outcomes.len());
            prop_assert_eq!(op.errors().iter().filter(|e| e.is_failure()).count(), failing);
            let expected = if failing == 0 { ExecutionState::Ok } else { ExecutionState::Error };
            prop_assert_eq!(state, expected);
        }

        /// Property: once cancellation is observed no later operation ends ok,
        /// and operations completed before it keep their state.
        #[test]
        fn cancellation_is_monotonic(count in 1usize..8, cancel_at in 0u64..10) {
            let flag = CancellationFlag::new();
            let progress = RecordingProgress::cancelling_at(flag.clone(), cancel_at);
            let log = Arc::new(Mutex::new(Vec::new()));
            let mut composite = CompositeOperation::new("prop");
            let handles: Vec<_> = (0..count)
                .map(|i| composite.add_action(scripted(&format!("op{}", i), &[StepOutcome::Ok], &log)))
                .collect();

            composite.run(&progress);

            let mut seen_not_ok = false;
            for handle in &handles {
                let state = composite.operation(*handle).unwrap().execution_state();
                if seen_not_ok {
                    prop_assert_ne!(state, ExecutionState::Ok);
                }
                seen_not_ok |= state != ExecutionState::Ok;
            }
            if flag.is_cancelled() {
                prop_assert_eq!(composite.execution_state(), ExecutionState::Cancelled);
            } else {
                prop_assert_eq!(composite.execution_state(), ExecutionState::Ok);
            }
        }

        /// Property: every acquire is matched by exactly one release, whatever
        /// the native calls do.
        #[test]
        fn leases_are_symmetric(
            failing in prop::collection::vec(prop_oneof![
                Just(None),
                Just(Some(FailureKind::Error)),
                Just(Some(FailureKind::Network)),
                Just(Some(FailureKind::Panic)),
            ], 1..6)
        ) {
            let (factory, location) = memory_location("main", "svn://host/repo");
            let repository = factory.repository();
            let mut working_copies = Vec::new();
            for (index, kind) in failing.iter().enumerate() {
                let path = format!("/wc/{}", index);
                repository.add_working_copy(path.as_str(), "svn://host/repo");
                if let Some(kind) = kind {
                    repository.inject(FailureRule::new("cleanup", Some(path.as_str()), *kind));
                }
                working_copies.push(WorkingCopy::new(path, location.clone()));
            }

            let mut op = Operation::new(CleanupOperation::new(working_copies));
            op.run(&NullProgress::new());

            let stats = location.stats();
            prop_assert_eq!(stats.acquired, failing.len() as u64);
            prop_assert_eq!(stats.released, stats.acquired);
            prop_assert_eq!(stats.outstanding, 0);
            prop_assert_eq!(op.errors().len(), failing.iter().filter(|k| k.is_some()).count());
        }
    }
}
