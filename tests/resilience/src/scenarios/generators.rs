//! Generator laws on real span data.

#[cfg(test)]
mod tests {
    use chaos_core::{GorkGenerator, MutationEngine, SpanMutator};
    use chaos_types::{GorkCategory, MutationKind, SpanMalformationKind};

    /// Every mutation kind changes a valid span.
    #[test]
    fn g_mut_01_every_mutation_changes_a_span() {
        let mut spans = SpanMutator::new(21);
        let mut engine = MutationEngine::new(21).with_overflow_bytes(4096);
        for span in spans.valid_trace(3) {
            for kind in MutationKind::ALL {
                let result = engine.mutate_with(&span, *kind);
                assert!(result.success, "{kind}: {:?}", result.error);
                assert!(result.changed(), "{kind} was a no-op on a span");
            }
        }
    }

    /// The probabilistic skip path is the only way to get an unchanged record.
    #[test]
    fn g_mut_02_rate_controls_skips() {
        let span = SpanMutator::new(5).base_span();
        let mut engine = MutationEngine::new(5);
        let mut skipped = 0;
        for _ in 0..200 {
            let result = engine.mutate(&span, &[], 0.5);
            assert!(result.success);
            if result.skipped() {
                skipped += 1;
                assert_eq!(result.mutated, span);
            } else {
                assert!(result.changed());
            }
        }
        assert!((50..150).contains(&skipped), "skipped {skipped} of 200");
    }

    /// Security payloads land in the requested fields.
    #[test]
    fn g_mut_03_targeted_security_payloads() {
        let record = chaos_types::Value::object([
            ("prompt", chaos_types::Value::from("summarize the incident")),
            ("api_key", chaos_types::Value::from("sk-test")),
            ("latency_ms", chaos_types::Value::Int(12)),
        ]);
        let mut engine = MutationEngine::new(9);
        for _ in 0..20 {
            let result = engine.mutate_targeted(&record, &["prompt", "api_key"], MutationKind::SECURITY, 0.5);
            assert!(result.changed());
            assert!(result
                .mutation_points
                .iter()
                .all(|p| p.contains("prompt") || p.contains("api_key")));
            assert_eq!(result.mutated.get("latency_ms"), record.get("latency_ms"));
        }
    }

    /// Every span malformation changes a span taken from a valid trace.
    #[test]
    fn g_span_01_every_malformation_changes_a_child() {
        let mut spans = SpanMutator::new(8).with_oversized_bytes(2048);
        let trace = spans.valid_trace(2);
        for kind in SpanMalformationKind::ALL {
            let out = spans.mutate_span(&trace[1], Some(*kind)).unwrap();
            assert_ne!(out.span, trace[1], "{kind} was a no-op");
        }
    }

    /// A corrupted trace is one root plus N children sharing the trace id.
    #[test]
    fn g_span_02_corrupted_trace_shape() {
        let mut spans = SpanMutator::new(4).with_oversized_bytes(2048);
        let trace = spans.create_malformed_trace(6, 0.5).unwrap();
        assert_eq!(trace.spans.len(), 7);
        assert_eq!(trace.children().len(), 6);
        assert!(!trace.malformations.is_empty());
        let root = trace.root().unwrap();
        assert_eq!(root.get("trace_id").and_then(|v| v.as_str()), Some(trace.trace_id.as_str()));
    }

    /// Every gork category changes serialized span JSON and names its expected failures.
    #[test]
    fn g_gork_01_every_category_changes_span_json() {
        let span = SpanMutator::new(2).base_span();
        let payload = serde_json::to_vec(&span.to_json().unwrap()).unwrap();
        let mut gork = GorkGenerator::new(2).with_bomb_bytes(64 * 1024);
        for category in GorkCategory::ALL {
            let result = gork.generate_gork(&payload, Some(*category), 0.1).unwrap();
            assert_ne!(result.gorked, payload, "{category} was a no-op");
            assert!(!result.expected_failures.is_empty());
        }
    }

    /// Same seed, same corruption.
    #[test]
    fn g_seed_01_seeded_generators_reproduce() {
        let run = |seed| {
            let mut spans = SpanMutator::new(seed).with_oversized_bytes(1024);
            let trace = spans.create_malformed_trace(3, 0.7).unwrap();
            let mut engine = MutationEngine::new(seed);
            let applied: Vec<_> = trace
                .spans
                .iter()
                .map(|s| engine.mutate(s, &[], 1.0).kind)
                .collect();
            let malformed: Vec<_> = trace.malformations.iter().map(|m| m.kind).collect();
            (trace.trace_id, malformed, applied)
        };
        assert_eq!(run(77), run(77));
    }
}
