// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the reconciliation run, against in-memory upstreams.

#[cfg(test)]
mod tests {
    use crate::constants::GUARD_KEY;
    use crate::errors::SyncError;
    use crate::guard::GuardStore;
    use crate::records::{DnsRecord, DnsRecordType, ExternalTlsaRecord};
    use crate::reconcilers::orchestrator::RunOutcome;
    use crate::test_support::Harness;
    use std::collections::HashSet;
    use std::time::Duration;

    const HOST: &str = "mail.example.com";
    const NAME: &str = "_25._tcp.mail.example.com";

    fn tlsa(content: &str) -> DnsRecord {
        DnsRecord::tlsa("_25._tcp.mail.example.com.", content)
    }

    fn completed(outcome: RunOutcome) -> crate::records::ReconciliationReport {
        match outcome {
            RunOutcome::Completed(report) => report,
            RunOutcome::SkippedConcurrent => panic!("run was skipped"),
        }
    }

    #[tokio::test]
    async fn test_first_run_publishes_record() {
        let harness = Harness::new(vec![tlsa("3 1 1 abcd")], vec![], &[HOST]);

        let report = completed(harness.orchestrator.run().await.unwrap());

        assert_eq!(report.added, vec![DnsRecord::tlsa(NAME, "3 1 1 abcd")]);
        assert!(report.deleted.is_empty());
        assert_eq!(report.dns_records, vec![tlsa("3 1 1 abcd")]);

        let published = harness.zones.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].name, NAME);
        assert_eq!(published[0].content, "3 1 1 abcd");
    }

    #[tokio::test]
    async fn test_orphan_is_removed() {
        let harness = Harness::new(
            vec![tlsa("3 1 1 abcd")],
            vec![
                ExternalTlsaRecord::new("1", NAME, "3 1 1 abcd"),
                ExternalTlsaRecord::new("2", NAME, "3 1 1 ffff"),
            ],
            &[HOST],
        );

        let report = completed(harness.orchestrator.run().await.unwrap());

        assert!(report.added.is_empty());
        assert_eq!(report.deleted, vec![DnsRecord::tlsa(NAME, "3 1 1 ffff")]);
        assert_eq!(
            harness.zones.published(),
            vec![ExternalTlsaRecord::new("1", NAME, "3 1 1 abcd")]
        );
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let harness = Harness::new(
            vec![tlsa("3 1 1 abcd"), tlsa("3 1 1 ef01")],
            vec![ExternalTlsaRecord::new("1", NAME, "3 1 1 0000")],
            &[HOST, "mx2.example.com"],
        );

        let first = completed(harness.orchestrator.run().await.unwrap());
        assert_eq!(first.added.len(), 4);
        assert_eq!(first.deleted.len(), 1);

        let second = completed(harness.orchestrator.run().await.unwrap());
        assert!(second.is_noop(), "second run changed something: {second:?}");
    }

    #[tokio::test]
    async fn test_irregular_whitespace_converges() {
        let harness = Harness::new(vec![tlsa(" 3 1  1 abcd ")], vec![], &[HOST]);

        let first = completed(harness.orchestrator.run().await.unwrap());
        assert_eq!(first.added.len(), 1);
        assert_eq!(harness.zones.published()[0].content, "3 1 1 abcd");

        let second = completed(harness.orchestrator.run().await.unwrap());
        assert!(second.is_noop(), "second run changed something: {second:?}");
    }

    #[tokio::test]
    async fn test_published_set_matches_authoritative_after_run() {
        let harness = Harness::new(
            vec![tlsa("3 1 1 aa"), tlsa("3 1 1 bb"), tlsa("3 1 1 bb")],
            vec![
                ExternalTlsaRecord::new("1", NAME, "3 1 1 aa"),
                ExternalTlsaRecord::new("2", NAME, "3 1 1 aa"),
                ExternalTlsaRecord::new("3", NAME, "3 1 1 cc"),
            ],
            &[HOST],
        );

        harness.orchestrator.run().await.unwrap();

        let published = harness.zones.published();
        let contents: Vec<_> = published.iter().map(|r| r.content.as_str()).collect();
        let unique: HashSet<_> = contents.iter().copied().collect();
        assert_eq!(contents.len(), unique.len(), "duplicates remain: {contents:?}");
        assert_eq!(unique, HashSet::from(["3 1 1 aa", "3 1 1 bb"]));
    }

    #[tokio::test]
    async fn test_hostnames_processed_in_order() {
        let harness = Harness::new(
            vec![tlsa("3 1 1 abcd")],
            vec![],
            &["b.example.com", "a.example.com"],
        );

        let report = completed(harness.orchestrator.run().await.unwrap());

        let names: Vec<_> = report.added.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["_25._tcp.b.example.com", "_25._tcp.a.example.com"]);
    }

    #[tokio::test]
    async fn test_malformed_record_is_reported_once() {
        let harness = Harness::new(
            vec![tlsa("3 1 abcd"), tlsa("3 1 1 abcd")],
            vec![],
            &[HOST, "mx2.example.com"],
        );

        let report = completed(harness.orchestrator.run().await.unwrap());

        assert_eq!(report.added.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].content, "3 1 abcd");
    }

    #[tokio::test]
    async fn test_non_tlsa_records_are_not_published() {
        let harness = Harness::new(
            vec![DnsRecord {
                record_type: DnsRecordType::Mx,
                name: "example.com.".to_string(),
                content: "10 mail.example.com.".to_string(),
            }],
            vec![],
            &[HOST],
        );

        let report = completed(harness.orchestrator.run().await.unwrap());
        assert!(report.is_noop());
    }

    // =====================================================
    // Guard behaviour
    // =====================================================

    #[tokio::test]
    async fn test_skipped_when_guard_held() {
        let harness = Harness::new(vec![tlsa("3 1 1 abcd")], vec![], &[HOST]);
        let lease = harness
            .guard
            .try_acquire(GUARD_KEY, Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        let outcome = harness.orchestrator.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::SkippedConcurrent);
        assert_eq!(harness.upstream_calls(), 0);
        // The other holder's lease is untouched
        assert!(harness.guard.is_held(GUARD_KEY).await.unwrap());
        assert!(harness.guard.release(&lease).await.unwrap());
    }

    #[tokio::test]
    async fn test_guard_released_after_success() {
        let harness = Harness::new(vec![tlsa("3 1 1 abcd")], vec![], &[HOST]);

        harness.orchestrator.run().await.unwrap();

        assert!(!harness.guard.is_held(GUARD_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_guard_released_after_record_source_failure() {
        let harness = Harness::new(vec![tlsa("3 1 1 abcd")], vec![], &[HOST]);
        *harness.source.fail.lock().unwrap() = true;

        let err = harness.orchestrator.run().await.unwrap_err();

        assert!(matches!(err, SyncError::Upstream { service: "stalwart", .. }));
        assert!(!harness.guard.is_held(GUARD_KEY).await.unwrap());
        // Zone was never looked up
        assert_eq!(harness.zones.calls(), 0);
    }

    #[tokio::test]
    async fn test_guard_released_after_zone_not_found() {
        let harness = Harness::new(vec![tlsa("3 1 1 abcd")], vec![], &[HOST]);
        *harness.zones.zone_missing.lock().unwrap() = true;

        let err = harness.orchestrator.run().await.unwrap_err();

        assert!(matches!(err, SyncError::ZoneNotFound { .. }));
        assert!(!harness.guard.is_held(GUARD_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_failure_aborts_run_and_releases_guard() {
        let harness = Harness::new(
            vec![tlsa("3 1 1 abcd")],
            vec![ExternalTlsaRecord::new("1", NAME, "3 1 1 ffff")],
            &[HOST],
        );
        *harness.zones.fail_create.lock().unwrap() = true;

        let err = harness.orchestrator.run().await.unwrap_err();

        assert!(matches!(err, SyncError::Upstream { operation: "create_tlsa_record", .. }));
        assert!(!harness.guard.is_held(GUARD_KEY).await.unwrap());
        // Deletions for the hostname never ran
        assert_eq!(harness.zones.published().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_changes_stay_applied_on_failure() {
        let harness = Harness::new(
            vec![tlsa("3 1 1 abcd")],
            vec![ExternalTlsaRecord::new("1", NAME, "3 1 1 ffff")],
            &[HOST],
        );
        *harness.zones.fail_delete.lock().unwrap() = true;

        assert!(harness.orchestrator.run().await.is_err());

        // The addition went through before the delete failed; nothing is rolled back
        let contents: Vec<_> = harness
            .zones
            .published()
            .into_iter()
            .map(|r| r.content)
            .collect();
        assert_eq!(contents, vec!["3 1 1 ffff".to_string(), "3 1 1 abcd".to_string()]);
        assert!(!harness.guard.is_held(GUARD_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_guard_released_after_panic() {
        let harness = Harness::new(vec![tlsa("3 1 1 abcd")], vec![], &[HOST]);
        *harness.source.panic.lock().unwrap() = true;

        let orchestrator = harness.orchestrator.clone();
        let joined = tokio::spawn(async move { orchestrator.run().await }).await;

        assert!(joined.unwrap_err().is_panic());
        assert!(!harness.guard.is_held(GUARD_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_run_after_failure_succeeds() {
        let harness = Harness::new(vec![tlsa("3 1 1 abcd")], vec![], &[HOST]);
        *harness.source.fail.lock().unwrap() = true;
        assert!(harness.orchestrator.run().await.is_err());

        *harness.source.fail.lock().unwrap() = false;
        let report = completed(harness.orchestrator.run().await.unwrap());
        assert_eq!(report.added.len(), 1);
    }

    #[tokio::test]
    async fn test_certificate_rotation_between_runs() {
        let harness = Harness::new(vec![tlsa("3 1 1 aaaa")], vec![], &[HOST]);
        harness.orchestrator.run().await.unwrap();

        harness.source.set_records(vec![tlsa("3 1 1 bbbb")]);
        let report = completed(harness.orchestrator.run().await.unwrap());

        assert_eq!(report.added, vec![DnsRecord::tlsa(NAME, "3 1 1 bbbb")]);
        assert_eq!(report.deleted, vec![DnsRecord::tlsa(NAME, "3 1 1 aaaa")]);
    }

    // =====================================================
    // Lease renewal and detached runs
    // =====================================================

    #[tokio::test]
    async fn test_lease_renewed_during_long_run() {
        let harness = Harness::with_guard_ttl(
            vec![tlsa("3 1 1 abcd")],
            vec![],
            &[HOST],
            Duration::from_millis(90),
        );
        harness.set_fetch_delay(Duration::from_millis(300));

        let orchestrator = harness.orchestrator.clone();
        let running = tokio::spawn(async move { orchestrator.run().await });

        // Well past the original TTL, the first run still holds the guard
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(harness
            .guard
            .try_acquire(GUARD_KEY, Duration::from_secs(60))
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            harness.orchestrator.run().await.unwrap(),
            RunOutcome::SkippedConcurrent
        );

        let report = completed(running.await.unwrap().unwrap());
        assert_eq!(report.added.len(), 1);
        assert!(!harness.guard.is_held(GUARD_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_detached_run_finishes_after_caller_goes_away() {
        let harness = Harness::new(vec![tlsa("3 1 1 abcd")], vec![], &[HOST]);
        harness.set_fetch_delay(Duration::from_millis(150));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            harness.orchestrator.clone().run_detached(),
        )
        .await;
        assert!(abandoned.is_err(), "run finished before the caller gave up");
        assert!(harness.guard.is_held(GUARD_KEY).await.unwrap());

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(!harness.guard.is_held(GUARD_KEY).await.unwrap());
        assert_eq!(harness.zones.published().len(), 1);
    }

    #[tokio::test]
    async fn test_detached_run_panic_becomes_error() {
        let harness = Harness::new(vec![tlsa("3 1 1 abcd")], vec![], &[HOST]);
        *harness.source.panic.lock().unwrap() = true;

        let err = harness.orchestrator.clone().run_detached().await.unwrap_err();

        assert!(matches!(err, SyncError::Aborted { .. }));
        assert_eq!(err.status_code(), 500);
        assert!(!harness.guard.is_held(GUARD_KEY).await.unwrap());
    }
}
