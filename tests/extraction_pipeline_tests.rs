//! Extraction pipeline behavior against in-memory fixture sessions
use std::sync::Arc;
use std::time::Duration;

use campaign_harvester_lib::crawling::{
    DispatchConfig, RecordAssembler, WorkDispatcher, WorkerExit,
};
use campaign_harvester_lib::domain::{
    FieldSpec, FieldValue, Record, TaskFailurePolicy, TaskFailureReason, WorkerId,
    references_from_urls,
};
use campaign_harvester_lib::infrastructure::config::defaults;
use campaign_harvester_lib::infrastructure::output_writer::{render_records, write_records};
use campaign_harvester_lib::infrastructure::{FixtureSessionFactory, FixtureSite};
use proptest::prelude::*;

fn project_urls(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("https://crowd.example/projects/p{i}"))
        .collect()
}

fn project_page(i: usize) -> String {
    format!(
        r#"<html><body>
            <div class="basicsSection-title">  Project   {i} </div>
            <div class="basicsCampaignOwner-details-name">Team {i}</div>
            <span class="basicsGoalProgress-amountSold">${i},250 USD</span>
            <span class="basicsGoalProgress-progressDetails-detailsGoal">raised of $20,000 goal</span>
            <div class="basicsGoalProgress-claimedOrBackers">{i} backers</div>
        </body></html>"#
    )
}

fn site(n: usize) -> FixtureSite {
    project_urls(n)
        .iter()
        .enumerate()
        .fold(FixtureSite::new(), |site, (i, url)| site.with_page(url, &project_page(i)))
}

fn schema() -> Vec<FieldSpec> {
    vec![
        FieldSpec::text("Title", ".basicsSection-title", "Unknown"),
        FieldSpec::text("Creators", ".basicsCampaignOwner-details-name", "Unknown"),
        FieldSpec::integer("DollarsPledged", ".basicsGoalProgress-amountSold"),
        FieldSpec::integer("DollarsGoal", ".basicsGoalProgress-progressDetails-detailsGoal")
            .with_after("of "),
        FieldSpec::integer("NumBackers", ".basicsGoalProgress-claimedOrBackers"),
        FieldSpec::integer("DaysToGo", ".basicsGoalProgress-progressDetails-daysLeft"),
        FieldSpec::boolean("FlexibleGoal", ".basicsGoalProgress-flexibleGoal", "flexible", false),
    ]
}

fn dispatcher(
    factory: &Arc<FixtureSessionFactory>,
    policy: TaskFailurePolicy,
) -> WorkDispatcher<FixtureSessionFactory> {
    WorkDispatcher::new(
        Arc::clone(factory),
        RecordAssembler::new(schema(), Duration::from_secs(5)),
        DispatchConfig {
            queue_capacity: 4,
            failure_policy: policy,
        },
    )
}

#[tokio::test]
async fn three_items_two_workers_create_two_sessions() {
    let factory = Arc::new(FixtureSessionFactory::new(site(3)));
    let items = references_from_urls(project_urls(3)).unwrap();

    let report = dispatcher(&factory, TaskFailurePolicy::Fallback)
        .run_with_report(items, 2)
        .await
        .unwrap();

    assert_eq!(report.records.len(), 3);
    assert_eq!(factory.stats().created, 2);
    assert_eq!(factory.stats().closed, 2);
    assert_eq!(report.workers.len(), 2);
    assert!(report.workers.iter().all(|w| w.exit == WorkerExit::Stopped));
}

#[tokio::test]
async fn every_record_covers_the_schema() {
    let factory = Arc::new(FixtureSessionFactory::new(site(5)));
    let records = dispatcher(&factory, TaskFailurePolicy::Fallback)
        .run(references_from_urls(project_urls(5)).unwrap(), 3)
        .await
        .unwrap();

    let schema = schema();
    let mut expected = vec!["id", "url"];
    expected.extend(schema.iter().map(|spec| spec.name.as_str()));
    for record in records.records() {
        assert_eq!(record.keys().collect::<Vec<_>>(), expected);
    }

    let third = &records.records()[2];
    assert_eq!(third.get("Title"), Some(&FieldValue::from("Project 2")));
    assert_eq!(third.get("DollarsPledged"), Some(&FieldValue::Integer(2250)));
    assert_eq!(third.get("DollarsGoal"), Some(&FieldValue::Integer(20_000)));
    assert_eq!(third.get("NumBackers"), Some(&FieldValue::Integer(2)));
    assert_eq!(third.get("DaysToGo"), Some(&FieldValue::Null));
    assert_eq!(third.get("FlexibleGoal"), Some(&FieldValue::Boolean(false)));
}

#[tokio::test]
async fn live_sessions_never_exceed_worker_count() {
    let urls = project_urls(12);
    let site = urls.iter().enumerate().fold(site(12), |site, (i, url)| {
        site.with_load_delay(url, Duration::from_millis(5 + (i as u64 % 4) * 3))
    });
    let factory = Arc::new(
        FixtureSessionFactory::new(site).with_startup_delay(Duration::from_millis(2)),
    );

    let report = dispatcher(&factory, TaskFailurePolicy::Fallback)
        .run_with_report(references_from_urls(&urls).unwrap(), 3)
        .await
        .unwrap();

    assert_eq!(report.records.len(), 12);
    assert!(factory.stats().peak_live <= 3);
    assert!(report.sessions.peak_live <= 3);
    assert_eq!(factory.stats().live, 0);
}

#[tokio::test]
async fn one_worker_failing_to_start_does_not_stop_the_run() {
    let factory = Arc::new(FixtureSessionFactory::new(site(6)).with_failing_worker(WorkerId(1)));
    let report = dispatcher(&factory, TaskFailurePolicy::Fallback)
        .run_with_report(references_from_urls(project_urls(6)).unwrap(), 3)
        .await
        .unwrap();

    assert_eq!(report.records.len(), 6);
    let failures = report.records.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].worker_id, WorkerId(1));
    assert!(matches!(failures[0].reason, TaskFailureReason::SessionInit(_)));

    let failed = &report.records.records()[failures[0].sequence_index];
    assert_eq!(failed.get("Title"), Some(&FieldValue::from("Unknown")));

    let worker = report.workers.iter().find(|w| w.worker_id == WorkerId(1)).unwrap();
    assert_eq!(worker.exit, WorkerExit::SessionInitFailed);
    assert_eq!(factory.stats().live, 0);
}

#[tokio::test]
async fn load_failures_follow_the_policy() {
    let urls = project_urls(4);
    let broken = || site(4).with_load_failure(&urls[0]).with_load_failure(&urls[3]);

    let fallback_factory = Arc::new(FixtureSessionFactory::new(broken()));
    let fallback = dispatcher(&fallback_factory, TaskFailurePolicy::Fallback)
        .run(references_from_urls(&urls).unwrap(), 2)
        .await
        .unwrap();
    assert_eq!(fallback.len(), 4);
    assert_eq!(fallback.failures().len(), 2);
    assert_eq!(fallback.records()[3].get("NumBackers"), Some(&FieldValue::Null));

    let omit_factory = Arc::new(FixtureSessionFactory::new(broken()));
    let omit = dispatcher(&omit_factory, TaskFailurePolicy::Omit)
        .run(references_from_urls(&urls).unwrap(), 2)
        .await
        .unwrap();
    let ids: Vec<_> = omit.records().iter().map(Record::id).collect();
    assert_eq!(ids, ["2", "3"]);
    assert_eq!(omit.failures().len(), 2);
}

#[test]
fn artifact_is_byte_identical_across_writes() {
    tokio_test::block_on(async {
        let factory = Arc::new(FixtureSessionFactory::new(site(4)));
        let records = dispatcher(&factory, TaskFailurePolicy::Fallback)
            .run(references_from_urls(project_urls(4)).unwrap(), 2)
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first").join(defaults::OUTPUT_FILE);
        let second = dir.path().join("second").join(defaults::OUTPUT_FILE);
        write_records(&records, &first).unwrap();
        write_records(&records, &second).unwrap();
        write_records(&records, &second).unwrap();

        let first = std::fs::read(first).unwrap();
        assert_eq!(first, std::fs::read(second).unwrap());
        assert_eq!(first, render_records(&records).unwrap());
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn records_are_ordered_regardless_of_completion_order(
        delays in proptest::collection::vec(0u64..12, 1..10),
        workers in 1usize..5,
    ) {
        let urls = project_urls(delays.len());
        let site = urls.iter().zip(&delays).fold(site(delays.len()), |site, (url, delay)| {
            site.with_load_delay(url, Duration::from_millis(*delay))
        });
        let factory = Arc::new(FixtureSessionFactory::new(site));
        let items = references_from_urls(&urls).unwrap();

        let records = tokio_test::block_on(
            dispatcher(&factory, TaskFailurePolicy::Fallback).run(items, workers),
        )
        .unwrap();

        let indices: Vec<_> = records.records().iter().map(Record::sequence_index).collect();
        prop_assert_eq!(indices, (0..delays.len()).collect::<Vec<_>>());
        prop_assert!(factory.stats().peak_live <= workers);
    }
}
