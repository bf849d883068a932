mod common;
use common::*;

#[cfg(test)]
mod resume
{
    use repertoire::prelude::*;
    use tempfile::tempdir;

    use super::*;
    use crate::common::{
        mocks::*,
        setup::{options, root},
    };

    const DEPTH: u32 = 3;
    const BREADTH: usize = 2;

    fn settings() -> TraversalSettings
    {
        options(DEPTH, BREADTH, 0.0).traversal()
    }

    /// Runs against the given store with fresh deterministic oracles, returning the outcome and oracle calls made.
    fn run(store: &ProgressStore, limits: RunLimits, workers: usize) -> (RunOutcome, usize, ExploreStats)
    {
        let popularity = FirstMoves::new(BREADTH);
        let responders = (0 .. workers).map(|_| FirstReply::default()).collect::<Vec<_>>();
        let mut explorer = TreeExplorer::new(options(DEPTH, BREADTH, 0.0), root(""), store, &popularity, responders).unwrap();
        let outcome = explorer.run(limits).unwrap();
        (outcome, popularity.calls.total(), explorer.stats())
    }

    /// The result of one uninterrupted run.
    fn reference() -> (ProgressState, usize, usize)
    {
        let store = ProgressStore::in_memory(root("").record(), settings());
        let (outcome, calls, stats) = run(&store, RunLimits::none(), 1);
        assert_eq!(outcome, RunOutcome::Exhausted);
        (store.snapshot(), calls, stats.processed)
    }

    #[test]
    fn resumes_at_every_boundary()
    {
        let _setup = setup::setup();
        let (expected, expected_calls, nodes) = reference();
        assert!(nodes > 5);

        for n in 1 .. nodes
        {
            let dir = tempdir().unwrap();
            let path = dir.path().join("progress.json");

            let first_calls = {
                let store = ProgressStore::open(&path, root("").record(), settings(), true).unwrap();
                let (outcome, calls, stats) = run(&store, RunLimits::nodes(n), 1);
                assert_eq!(outcome, RunOutcome::NodeLimit, "interrupting after {n}");
                assert_eq!(stats.processed, n);
                calls
            };

            let store = ProgressStore::open(&path, root("").record(), settings(), true).unwrap();
            let (outcome, second_calls, _) = run(&store, RunLimits::none(), 1);
            assert_eq!(outcome, RunOutcome::Exhausted, "resuming after {n}");

            assert_eq!(store.snapshot(), expected, "resuming after {n}");
            assert_eq!(first_calls + second_calls, expected_calls, "resuming after {n}");
            assert_eq!(ProgressStore::load(&path).unwrap().unwrap(), expected, "resuming after {n}");
        }
    }

    #[test]
    fn resumes_with_a_different_worker_count()
    {
        let _setup = setup::setup();
        let (expected, _, _) = reference();

        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");

        {
            let store = ProgressStore::open(&path, root("").record(), settings(), true).unwrap();
            let (outcome, _, _) = run(&store, RunLimits::nodes(4), 3);
            assert_eq!(outcome, RunOutcome::NodeLimit);
        }

        let store = ProgressStore::open(&path, root("").record(), settings(), true).unwrap();
        let (outcome, _, _) = run(&store, RunLimits::none(), 2);
        assert_eq!(outcome, RunOutcome::Exhausted);
        assert_eq!(store.snapshot(), expected);
    }

    #[test]
    fn a_fresh_start_discards_progress()
    {
        let _setup = setup::setup();
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");

        {
            let store = ProgressStore::open(&path, root("").record(), settings(), true).unwrap();
            run(&store, RunLimits::nodes(3), 1);
        }

        let store = ProgressStore::open(&path, root("").record(), settings(), false).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.frontier_len(), 1);

        let (_, calls, _) = run(&store, RunLimits::none(), 1);
        let (_, expected_calls, _) = reference();
        assert_eq!(calls, expected_calls);
    }

    #[test]
    fn a_corrupt_store_is_refused()
    {
        let _setup = setup::setup();
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");

        {
            let store = ProgressStore::open(&path, root("").record(), settings(), true).unwrap();
            run(&store, RunLimits::nodes(3), 1);
        }

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, &text[.. text.len() / 2]).unwrap();

        let err = ProgressStore::open(&path, root("").record(), settings(), true).unwrap_err();
        assert_eq!(err.kind, Kind::ProgressStoreCorruption);
    }

    #[test]
    fn an_incompatible_schema_is_refused()
    {
        let _setup = setup::setup();
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");

        let mut state = ProgressState::new(root("").record(), settings());
        state.schema_version = SCHEMA_VERSION + 1;
        ProgressStore::save(&path, &state).unwrap();

        let err = ProgressStore::open(&path, root("").record(), settings(), true).unwrap_err();
        assert_eq!(err.kind, Kind::ProgressStoreCorruption);
    }

    #[test]
    fn a_different_root_is_refused()
    {
        let _setup = setup::setup();
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");

        ProgressStore::open(&path, root("1. e4").record(), settings(), true).unwrap();
        let err = ProgressStore::open(&path, root("1. d4").record(), settings(), true).unwrap_err();
        assert_eq!(err.kind, Kind::MismatchError);
    }

    #[test]
    fn other_settings_are_refused()
    {
        let _setup = setup::setup();
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let shallow = options(1, BREADTH, 0.0);

        {
            let store = ProgressStore::open(&path, root("").record(), shallow.traversal(), true).unwrap();
            let popularity = FirstMoves::new(BREADTH);
            let mut explorer = TreeExplorer::new(shallow.clone(), root(""), &store, &popularity, vec![FirstReply::default()]).unwrap();
            assert_eq!(explorer.run(RunLimits::none()).unwrap(), RunOutcome::Exhausted);
        }

        // Going deeper would otherwise find every depth-limited leaf already resolved and do nothing.
        let err = ProgressStore::open(&path, root("").record(), settings(), true).unwrap_err();
        assert_eq!(err.kind, Kind::MismatchError);

        let store = ProgressStore::open(&path, root("").record(), shallow.traversal(), true).unwrap();
        let popularity = FirstMoves::new(BREADTH);
        let mismatched = TreeExplorer::new(options(DEPTH, BREADTH, 0.0), root(""), &store, &popularity, vec![FirstReply::default()]);
        assert_eq!(mismatched.err().map(|e| e.kind), Some(Kind::MismatchError));

        let store = ProgressStore::open(&path, root("").record(), settings(), false).unwrap();
        let (outcome, calls, _) = run(&store, RunLimits::none(), 1);
        let (expected, expected_calls, _) = reference();
        assert_eq!(outcome, RunOutcome::Exhausted);
        assert_eq!(calls, expected_calls);
        assert_eq!(store.snapshot(), expected);
    }

    #[test]
    fn a_journal_left_by_an_interruption_is_replayed()
    {
        let _setup = setup::setup();
        let (expected, _, _) = reference();
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");

        {
            let store = ProgressStore::open(&path, root("").record(), settings(), true).unwrap();
            run(&store, RunLimits::nodes(5), 1);
            assert_eq!(store.flushes(), 1);
        }

        let loaded = ProgressStore::load(&path).unwrap().unwrap();
        assert_eq!(loaded.sequence, 5);
        let frequencies = loaded.entries.values().flat_map(|e| e.expansions.iter()).map(|x| x.candidate.frequency).collect::<Vec<_>>();
        assert!(frequencies.contains(&(1000.0 / 7919.0)));
        assert!(frequencies.contains(&(500.0 / 7919.0)));

        let store = ProgressStore::open(&path, root("").record(), settings(), true).unwrap();
        run(&store, RunLimits::none(), 1);
        assert_eq!(store.snapshot(), expected);
    }
}
