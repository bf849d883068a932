mod common;
use common::*;

#[cfg(test)]
mod explore
{
    use std::sync::atomic::Ordering;

    use repertoire::prelude::*;

    use super::*;
    use crate::common::{
        mocks::*,
        setup::{key, options, root},
    };

    /// Runs an in-memory exploration to the end.
    fn explore<P, R>(options: ExploreOptions, root: Root, popularity: &P, responders: Vec<R>) -> (ProgressStore, ExploreStats)
    where
        P: PopularityOracle,
        R: ResponseOracle,
    {
        let store = ProgressStore::in_memory(root.record(), options.traversal());
        let stats = {
            let mut explorer = TreeExplorer::new(options, root, &store, popularity, responders).unwrap();
            assert_eq!(explorer.run(RunLimits::none()).unwrap(), RunOutcome::Exhausted);
            explorer.stats()
        };
        (store, stats)
    }

    #[test]
    fn example_scenario()
    {
        let _setup = setup::setup();
        let popularity = ScriptedPopularity::new().at("", &[("e2e4", 0.45), ("d2d4", 0.30), ("c2c4", 0.10)]);
        let responder = ScriptedResponder::new().after("1. e4", "e7e5").after("1. d4", "d7d5");

        let (store, stats) = explore(options(2, 2, 0.10), root(""), &popularity, vec![responder.clone()]);
        let state = store.snapshot();

        let root_entry = store.entry(&key("")).unwrap();
        assert_eq!(root_entry.status, EntryStatus::Completed);
        let children = root_entry.expansions.iter().filter_map(|e| e.child().cloned()).collect::<Vec<_>>();
        assert_eq!(children, vec![key("1. e4 e5"), key("1. d4 d5")]);

        for moves in ["1. e4 e5", "1. d4 d5"]
        {
            let entry = store.entry(&key(moves)).unwrap();
            assert_eq!(entry.depth, 1);
            assert_eq!(entry.status, EntryStatus::Terminal { reason: TerminalReason::NoPopularMoves });
            assert_eq!(popularity.calls.at(moves), 1);
        }

        let paths = Paths::new(&state, TranspositionPolicy::Record).collect::<Vec<_>>();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].line.uci(), "e2e4 e7e5");
        assert_eq!(paths[1].line.uci(), "d2d4 d7d5");
        assert_eq!(Paths::transpositions(&state), 0);
        assert!(state.entries.values().all(|e| !e.has_failures()));

        assert_eq!(stats.processed, 3);
        assert_eq!(stats.expanded, 1);
        assert_eq!(stats.transpositions, 0);
        assert_eq!(stats.failed, 0);
        assert_eq!(responder.calls.total(), 2);
        assert_eq!(responder.calls.at("1. c4"), 0);
    }

    #[test]
    fn transpositions_are_expanded_once()
    {
        let _setup = setup::setup();
        let popularity = ScriptedPopularity::new()
            .at("", &[("g1f3", 0.5), ("d2d4", 0.4)])
            .at("1. Nf3 d5", &[("d2d4", 0.6)])
            .at("1. d4 Nf6", &[("g1f3", 0.6)]);
        let responder = ScriptedResponder::new()
            .after("1. Nf3", "d7d5")
            .after("1. d4", "g8f6")
            .after("1. Nf3 d5 2. d4", "g8f6")
            .after("1. d4 Nf6 2. Nf3", "d7d5");

        let (store, stats) = explore(options(3, 5, 0.0), root(""), &popularity, vec![responder.clone()]);

        assert_eq!(popularity.calls.total(), 4);
        assert_eq!(popularity.calls.most(), 1);
        assert_eq!(popularity.calls.at("1. Nf3 d5 2. d4 Nf6"), 1);
        assert_eq!(responder.calls.most(), 1);
        assert_eq!(stats.transpositions, 1);
        assert_eq!(store.len(), 4);

        let state = store.snapshot();
        assert_eq!(Paths::transpositions(&state), 1);
        assert_eq!(Paths::new(&state, TranspositionPolicy::Record).count(), 2);
        assert_eq!(Paths::new(&state, TranspositionPolicy::Suppress).count(), 1);
    }

    #[test]
    fn depth_is_bounded()
    {
        let _setup = setup::setup();
        let popularity = FirstMoves::new(2);
        let (store, _) = explore(options(3, 5, 0.0), root(""), &popularity, vec![FirstReply::default()]);
        let state = store.snapshot();

        assert!(state.frontier.is_empty());
        for entry in state.entries.values()
        {
            assert!(entry.depth <= 3);
            if entry.depth == 3
            {
                assert_eq!(entry.status, EntryStatus::Terminal { reason: TerminalReason::DepthLimit });
                assert!(entry.expansions.is_empty());
            }
        }

        let expandable = state.entries.values().filter(|e| e.depth < 3).count();
        assert_eq!(popularity.calls.total(), expandable);
        assert!(Paths::new(&state, TranspositionPolicy::Record).all(|p| p.depth() <= 3));
    }

    #[test]
    fn filters_by_frequency_and_games()
    {
        let _setup = setup::setup();
        let popularity = ScriptedPopularity::new().with_games(
            "",
            &[("e2e4", 40_000, 0.45), ("d2d4", 300, 0.30), ("c2c4", 9_000, 0.15), ("g1f3", 8_000, 0.05)],
        );
        let responder = ScriptedResponder::new().after("1. e4", "e7e5").after("1. c4", "e7e5");

        let options = ExploreOptions {
            min_games: 500,
            ..options(1, 5, 0.10)
        };
        let (store, _) = explore(options.clone(), root(""), &popularity, vec![responder]);

        let entry = store.entry(&key("")).unwrap();
        let expanded = entry.expansions.iter().map(|e| e.candidate.uci.as_str()).collect::<Vec<_>>();
        assert_eq!(expanded, vec!["e2e4", "c2c4"]);
        assert!(entry
            .expansions
            .iter()
            .all(|e| e.candidate.frequency >= options.min_frequency && e.candidate.games >= options.min_games));
    }

    #[test]
    fn breadth_caps_before_the_floor()
    {
        let _setup = setup::setup();
        let popularity = ScriptedPopularity::new().at("", &[("e2e4", 0.45), ("d2d4", 0.05), ("c2c4", 0.30)]);
        let responder = ScriptedResponder::new().after("1. e4", "e7e5").after("1. c4", "e7e5");

        let (store, _) = explore(options(1, 2, 0.10), root(""), &popularity, vec![responder]);

        // c4 passes the floor but is outside the top two.
        let entry = store.entry(&key("")).unwrap();
        assert_eq!(entry.expansions.len(), 1);
        assert_eq!(entry.expansions[0].candidate.uci, "e2e4");
    }

    #[test]
    fn nothing_popular_is_terminal()
    {
        let _setup = setup::setup();
        let popularity = ScriptedPopularity::new().at("", &[("e2e4", 0.05)]);
        let (store, stats) = explore(options(4, 5, 0.10), root(""), &popularity, vec![ScriptedResponder::new()]);

        assert_eq!(store.entry(&key("")).unwrap().status, EntryStatus::Terminal { reason: TerminalReason::NoPopularMoves });
        assert_eq!(stats.terminal, 1);
    }

    #[test]
    fn malformed_candidates_are_discarded()
    {
        let _setup = setup::setup();
        let popularity = ScriptedPopularity::new().at("", &[("e2e5", 0.5), ("zz", 0.3), ("d2d4", 0.2)]);
        let responder = ScriptedResponder::new().after("1. d4", "d7d5");

        let (store, _) = explore(options(1, 2, 0.0), root(""), &popularity, vec![responder]);

        let entry = store.entry(&key("")).unwrap();
        assert_eq!(entry.status, EntryStatus::Completed);
        assert_eq!(entry.discarded.len(), 2);
        assert_eq!(entry.expansions.len(), 1);
        assert_eq!(entry.expansions[0].candidate.uci, "d2d4");
    }

    #[test]
    fn failures_stay_in_their_branch()
    {
        let _setup = setup::setup();
        let popularity = ScriptedPopularity::new()
            .at("", &[("e2e4", 0.4), ("d2d4", 0.3), ("g1f3", 0.2)])
            .failing_at("1. e4 e5", Kind::TransientSourceError);
        let responder = ScriptedResponder::new()
            .after("1. e4", "e7e5")
            .failing_after("1. d4", Kind::EngineUnavailable)
            .failing_after("1. Nf3", Kind::EngineTimeout);

        let (store, stats) = explore(options(2, 5, 0.0), root(""), &popularity, vec![responder]);

        let entry = store.entry(&key("")).unwrap();
        assert_eq!(entry.status, EntryStatus::Completed);
        assert!(matches!(entry.expansions[0].outcome, ReplyOutcome::Reply { .. }));
        assert!(matches!(entry.expansions[1].outcome, ReplyOutcome::Failed { .. }));
        assert_eq!(entry.expansions[2].outcome, ReplyOutcome::NoResponse);
        assert!(entry.has_failures());

        // Retried up to the policy's limit, then recorded.
        assert_eq!(popularity.calls.at("1. e4 e5"), 3);
        let failed = store.entry(&key("1. e4 e5")).unwrap();
        assert!(matches!(failed.status, EntryStatus::Failed { .. }));
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn silent_engine_is_no_response()
    {
        let _setup = setup::setup();
        let popularity = ScriptedPopularity::new().at("", &[("e2e4", 0.4), ("d2d4", 0.3)]);
        let responder = ScriptedResponder::new()
            .failing_after("1. e4", Kind::EngineTimeout)
            .failing_after("1. d4", Kind::EngineTimeout);

        let (store, _) = explore(options(2, 5, 0.0), root(""), &popularity, vec![responder]);

        let entry = store.entry(&key("")).unwrap();
        assert_eq!(entry.status, EntryStatus::Terminal { reason: TerminalReason::NoResponse });
        assert_eq!(entry.expansions.len(), 2);
    }

    #[test]
    fn mating_candidates_end_the_line()
    {
        let _setup = setup::setup();
        let root = root("1. f3 e5 2. g4");
        let popularity = ScriptedPopularity::new().at("1. f3 e5 2. g4", &[("d8h4", 0.6)]);
        let responder = ScriptedResponder::new();

        let (store, _) = explore(options(2, 5, 0.0), root.clone(), &popularity, vec![responder.clone()]);

        let entry = store.entry(root.key()).unwrap();
        assert_eq!(entry.status, EntryStatus::Completed);
        assert_eq!(entry.expansions[0].outcome, ReplyOutcome::GameOver { reason: GameOverReason::Checkmate });
        assert_eq!(responder.calls.total(), 0);

        let state = store.snapshot();
        let paths = Paths::new(&state, TranspositionPolicy::Record).collect::<Vec<_>>();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].line.uci(), "d8h4");
        assert_eq!(paths[0].leaf, Leaf::Terminal(TerminalReason::GameOver(GameOverReason::Checkmate)));
    }

    #[test]
    fn workers_do_not_change_the_result()
    {
        let _setup = setup::setup();
        let single = FirstMoves::new(3);
        let (alone, _) = explore(options(3, 3, 0.0), root(""), &single, vec![FirstReply::default()]);

        let pooled = FirstMoves::new(3);
        let workers = vec![FirstReply::default(), FirstReply::default(), FirstReply::default()];
        let (together, _) = explore(options(3, 3, 0.0), root(""), &pooled, workers);

        assert_eq!(alone.snapshot(), together.snapshot());
        assert_eq!(single.calls.total(), pooled.calls.total());
        assert_eq!(pooled.calls.most(), 1);
    }

    #[test]
    fn limits_and_cancellation_stop_between_nodes()
    {
        let _setup = setup::setup();
        let popularity = FirstMoves::new(2);
        let root = root("");
        let store = ProgressStore::in_memory(root.record(), options(3, 2, 0.0).traversal());
        let mut explorer = TreeExplorer::new(options(3, 2, 0.0), root, &store, &popularity, vec![FirstReply::default()]).unwrap();

        assert_eq!(explorer.run(RunLimits::nodes(2)).unwrap(), RunOutcome::NodeLimit);
        assert_eq!(store.len(), 2);
        assert_eq!(store.frontier_len(), 3);

        explorer.cancel_handle().store(true, Ordering::SeqCst);
        assert_eq!(explorer.run(RunLimits::none()).unwrap(), RunOutcome::Cancelled);
        assert_eq!(store.len(), 2);
        assert_eq!(explorer.stats().processed, 2);
    }

    #[test]
    fn rejects_unusable_options()
    {
        let _setup = setup::setup();
        let popularity = FirstMoves::new(2);
        let root = root("");
        let store = ProgressStore::in_memory(root.record(), options(3, 2, 0.1).traversal());

        let no_breadth = TreeExplorer::new(options(3, 0, 0.0), root.clone(), &store, &popularity, vec![FirstReply::default()]);
        assert_eq!(no_breadth.err().map(|e| e.kind), Some(Kind::ConfigError));

        let bad_floor = TreeExplorer::new(options(3, 2, 1.5), root.clone(), &store, &popularity, vec![FirstReply::default()]);
        assert_eq!(bad_floor.err().map(|e| e.kind), Some(Kind::ConfigError));

        let no_workers = TreeExplorer::new(options(3, 2, 0.1), root.clone(), &store, &popularity, Vec::<FirstReply>::new());
        assert_eq!(no_workers.err().map(|e| e.kind), Some(Kind::ConfigError));

        let deeper = TreeExplorer::new(options(5, 2, 0.1), root, &store, &popularity, vec![FirstReply::default()]);
        assert_eq!(deeper.err().map(|e| e.kind), Some(Kind::MismatchError));
    }
}
