// tests/poller_cycle.rs
mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use notam_relay::poller::ResetError;
use notam_relay::{Config, Notice, PollOutcome, Poller, PollerSettings, SeenSet};

fn completed(outcome: PollOutcome) -> notam_relay::CycleReport {
    match outcome {
        PollOutcome::Completed(r) => r,
        PollOutcome::Skipped => panic!("expected a completed cycle"),
    }
}

#[tokio::test]
async fn delivered_notice_is_not_delivered_again() {
    let tmp = tempfile::tempdir().unwrap();
    let source = FakeSource::with(vec![notice("a", "RWY 09 CLSD"), notice("b", "TWY A CLSD")]);
    let transport = RecordingTransport::new();
    let p = poller(settings(false), source, transport.clone(), store(tmp.path()), SeenSet::new(1000));

    let r1 = completed(p.poll().await);
    assert_eq!((r1.fetched, r1.new, r1.delivered), (2, 2, 2));

    let r2 = completed(p.poll().await);
    assert_eq!((r2.new, r2.delivered), (0, 0));
    assert_eq!(transport.count(), 2);
    assert_eq!(p.seen_count(), 2);

    let sent = transport.sent.lock().clone();
    assert!(sent.iter().all(|(dest, _)| dest == DEST));
    assert!(sent[0].1.starts_with("KBLM NOTAM"));
    assert!(sent[0].1.contains("RWY 09 CLSD"));
}

#[tokio::test]
async fn failed_delivery_does_not_block_the_rest_and_is_retried() {
    let tmp = tempfile::tempdir().unwrap();
    let source = FakeSource::with(vec![
        notice("n1", "first"),
        notice("n2", "second"),
        notice("n3", "third"),
    ]);
    let transport = RecordingTransport::new();
    transport.fail_when_contains(Some("second"));
    let st = store(tmp.path());
    let p = poller(settings(false), source, transport.clone(), st.clone(), SeenSet::new(1000));

    let r = completed(p.poll().await);
    assert_eq!(transport.count(), 3, "all three attempted");
    assert_eq!((r.delivered, r.failed), (2, 1));

    let on_disk = st.load().await;
    assert!(on_disk.contains("n1"));
    assert!(!on_disk.contains("n2"));
    assert!(on_disk.contains("n3"));

    transport.fail_when_contains(None);
    let r = completed(p.poll().await);
    assert_eq!((r.new, r.delivered, r.failed), (1, 1, 0));
    let msgs = transport.messages();
    assert_eq!(msgs.len(), 4);
    assert!(msgs[3].contains("second"));
}

#[tokio::test]
async fn startup_probe_delivers_first_notice_once() {
    let tmp = tempfile::tempdir().unwrap();
    let source = FakeSource::with(vec![notice("a", "latest"), notice("b", "older")]);
    let transport = RecordingTransport::new();
    let seen = SeenSet::from_ids(["a", "b"], 1000);
    let p = poller(settings(true), source, transport.clone(), store(tmp.path()), seen);

    let r = completed(p.poll().await);
    assert!(r.probe);
    assert_eq!(r.new, 0);
    assert_eq!(r.delivered, 1);
    assert!(transport.messages()[0].contains("latest"));

    let r = completed(p.poll().await);
    assert!(!r.probe);
    assert_eq!(transport.count(), 1);
}

#[tokio::test]
async fn startup_probe_after_cold_start_seeding_sends_exactly_one() {
    let tmp = tempfile::tempdir().unwrap();
    let source = FakeSource::with(vec![
        notice("a", "latest"),
        notice("b", "older"),
        notice("c", "oldest"),
    ]);
    let transport = RecordingTransport::new();
    let p = poller(settings(true), source.clone(), transport.clone(), store(tmp.path()), SeenSet::new(1000));

    let r = completed(p.poll().await);
    assert_eq!(r.seeded, 3);
    assert!(r.probe);
    assert_eq!(transport.count(), 1);
    assert!(transport.messages()[0].contains("latest"));

    // Later notices are delivered normally; the probe never fires again.
    source.set(vec![notice("d", "brand new"), notice("a", "latest")]);
    let r = completed(p.poll().await);
    assert!(!r.probe);
    assert_eq!(r.delivered, 1);
    assert!(transport.messages()[1].contains("brand new"));

    let r = completed(p.poll().await);
    assert_eq!((r.new, r.delivered, r.probe), (0, 0, false));
}

#[tokio::test]
async fn cold_start_without_probe_delivers_everything() {
    let tmp = tempfile::tempdir().unwrap();
    let source = FakeSource::with(vec![notice("a", "one"), notice("b", "two")]);
    let transport = RecordingTransport::new();
    let p = poller(settings(false), source, transport.clone(), store(tmp.path()), SeenSet::new(1000));

    let r = completed(p.poll().await);
    assert_eq!((r.seeded, r.delivered), (0, 2));
    assert!(!r.probe);
    assert_eq!(transport.count(), 2);
}

#[tokio::test]
async fn default_config_with_probe_pages_only_the_latest_on_cold_start() {
    let cfg = Config::from_lookup(|k| {
        match k {
            "AIRPORT_CODE" => Some(AIRPORT),
            "PAGER_DESTINATION" => Some(DEST),
            "PAGER_TRANSPORT" => Some("log"),
            "NOTAM_SOURCE" => Some("notam-search"),
            "STARTUP_PROBE" => Some("true"),
            _ => None,
        }
        .map(str::to_string)
    })
    .unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let source = FakeSource::with(vec![
        notice("a", "latest"),
        notice("b", "older"),
        notice("c", "oldest"),
    ]);
    let transport = RecordingTransport::new();
    let p = poller(
        PollerSettings::from_config(&cfg),
        source,
        transport.clone(),
        store(tmp.path()),
        SeenSet::new(1000),
    );

    let r = completed(p.poll().await);
    assert!(r.probe);
    assert_eq!(r.delivered, 1);
    assert_eq!(transport.count(), 1);
    assert!(transport.messages()[0].contains("latest"));

    let r = completed(p.poll().await);
    assert_eq!((r.new, r.delivered), (0, 0));
    assert_eq!(p.seen_count(), 3);
}

#[tokio::test]
async fn probe_disabled_sends_nothing_when_nothing_is_new() {
    let tmp = tempfile::tempdir().unwrap();
    let source = FakeSource::with(vec![notice("a", "latest")]);
    let transport = RecordingTransport::new();
    let seen = SeenSet::from_ids(["a"], 1000);
    let p = poller(settings(false), source, transport.clone(), store(tmp.path()), seen);

    let r = completed(p.poll().await);
    assert!(!r.probe);
    assert_eq!(transport.count(), 0);
}

#[tokio::test]
async fn probe_is_spent_by_a_first_cycle_whose_fetch_failed() {
    let tmp = tempfile::tempdir().unwrap();
    let source = FakeSource::with(vec![notice("a", "latest")]);
    source.set_failing(true);
    let transport = RecordingTransport::new();
    let seen = SeenSet::from_ids(["a"], 1000);
    let p = poller(settings(true), source.clone(), transport.clone(), store(tmp.path()), seen);

    let r = completed(p.poll().await);
    assert!(r.fetch_error.is_some());
    assert!(!r.probe);

    source.set_failing(false);
    let r = completed(p.poll().await);
    assert!(!r.probe);
    assert_eq!(transport.count(), 0);
}

#[tokio::test]
async fn fetch_failure_is_an_empty_cycle() {
    let tmp = tempfile::tempdir().unwrap();
    let source = FakeSource::with(vec![notice("a", "x")]);
    source.set_failing(true);
    let transport = RecordingTransport::new();
    let st = store(tmp.path());
    let p = poller(settings(false), source, transport.clone(), st.clone(), SeenSet::new(1000));

    let r = completed(p.poll().await);
    assert_eq!(r.fetched, 0);
    assert!(r.fetch_error.unwrap().contains("upstream unavailable"));
    assert_eq!(transport.count(), 0);
    assert!(st.path().exists(), "seen-set is still persisted");
}

#[tokio::test]
async fn overlapping_poll_is_dropped_without_blocking() {
    let tmp = tempfile::tempdir().unwrap();
    let source = FakeSource::with(vec![notice("a", "x")]);
    let transport = GateTransport::new();
    let p = Arc::new(poller(
        settings(false),
        source.clone(),
        transport.clone(),
        store(tmp.path()),
        SeenSet::new(1000),
    ));

    let first = {
        let p = p.clone();
        tokio::spawn(async move { p.poll().await })
    };
    transport.entered.notified().await;
    assert!(p.is_polling());

    let second = tokio::time::timeout(Duration::from_secs(1), p.poll())
        .await
        .expect("second poll must not wait for the first");
    assert!(matches!(second, PollOutcome::Skipped));
    assert!(matches!(p.reset().await, Err(ResetError::Busy)));

    transport.gate.add_permits(1);
    let r = completed(first.await.unwrap());
    assert_eq!(r.delivered, 1);
    assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert!(!p.is_polling());
    assert_eq!(p.seen_count(), 1);
}

#[tokio::test]
async fn duplicate_ids_within_one_fetch_are_sent_once() {
    let tmp = tempfile::tempdir().unwrap();
    let source = FakeSource::with(vec![notice("dup", "first copy"), notice("dup", "second copy")]);
    let transport = RecordingTransport::new();
    let p = poller(settings(false), source, transport.clone(), store(tmp.path()), SeenSet::new(1000));

    let r = completed(p.poll().await);
    assert_eq!(r.delivered, 1);
    assert_eq!(transport.count(), 1);
    assert!(transport.messages()[0].contains("first copy"));
}

#[tokio::test]
async fn unstable_ids_repeat_every_cycle_unless_disabled() {
    let tmp = tempfile::tempdir().unwrap();
    let source = FakeSource::with(vec![Notice::new(None, &[], "no id at all")]);
    let transport = RecordingTransport::new();
    let p = poller(settings(false), source.clone(), transport.clone(), store(tmp.path()), SeenSet::new(1000));

    p.poll().await;
    // Real adapters mint a fresh ephemeral id on every fetch.
    source.set(vec![Notice::new(None, &[], "no id at all")]);
    p.poll().await;
    assert_eq!(transport.count(), 2);
    assert_eq!(p.seen_count(), 0, "ephemeral ids are not retained");

    let tmp2 = tempfile::tempdir().unwrap();
    let transport2 = RecordingTransport::new();
    let mut s = settings(false);
    s.allow_unstable_ids = false;
    let p2 = poller(s, source, transport2.clone(), store(tmp2.path()), SeenSet::new(1000));
    let r = completed(p2.poll().await);
    assert_eq!((r.fetched, r.new), (1, 0));
    assert_eq!(transport2.count(), 0);
}

#[tokio::test]
async fn seen_set_survives_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let source = FakeSource::with(vec![notice("a", "x"), notice("b", "y")]);
    let transport = RecordingTransport::new();

    let p = Poller::start(settings(false), source.clone(), transport.clone(), store(tmp.path())).await;
    p.poll().await;
    assert_eq!(transport.count(), 2);
    drop(p);

    let p = Poller::start(settings(false), source, transport.clone(), store(tmp.path())).await;
    assert_eq!(p.seen_count(), 2);
    let r = completed(p.poll().await);
    assert_eq!(r.delivered, 0);
    assert_eq!(transport.count(), 2);
}

#[tokio::test]
async fn reset_forgets_everything_and_redelivers() {
    let tmp = tempfile::tempdir().unwrap();
    let source = FakeSource::with(vec![notice("a", "x"), notice("b", "y")]);
    let transport = RecordingTransport::new();
    let st = store(tmp.path());
    let p = poller(settings(false), source, transport.clone(), st.clone(), SeenSet::new(1000));

    p.poll().await;
    assert_eq!(p.reset().await.unwrap(), 2);
    assert_eq!(p.seen_count(), 0);
    assert!(st.load().await.is_empty());

    let r = completed(p.poll().await);
    assert_eq!(r.delivered, 2);
    assert_eq!(transport.count(), 4);
}

#[tokio::test(start_paused = true)]
async fn deliveries_are_spaced_by_the_configured_delay() {
    let tmp = tempfile::tempdir().unwrap();
    let source = FakeSource::with(vec![
        notice("1", "alpha"),
        notice("2", "bravo"),
        notice("3", "charlie"),
    ]);
    let transport = RecordingTransport::new();
    transport.fail_when_contains(Some("bravo"));
    let mut s = settings(false);
    s.delivery_delay = Duration::from_secs(2);
    let p = poller(s, source, transport.clone(), store(tmp.path()), SeenSet::new(1000));

    let t0 = tokio::time::Instant::now();
    p.poll().await;
    assert!(t0.elapsed() >= Duration::from_secs(4), "two gaps between three sends");
    assert_eq!(transport.count(), 3);
}
