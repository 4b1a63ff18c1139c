use tcapsrt_core::config::{default_config, ReplayConfig, SrtConfig};
use tcapsrt_core::{read_facts, CamelSrtInfo, Role, Runtime, SessionId, SrtCategory};

use chrono::Duration;

fn fixture() -> String {
    format!("{}/tests/data/camel_calls.csv", env!("CARGO_MANIFEST_DIR"))
}

fn replay_config(persistent: bool, passes: usize) -> SrtConfig {
    let mut config = default_config();
    config.tcap.persistent = persistent;
    config.tcap.display = false;
    config.camel.persistent = persistent;
    config.camel.display = false;
    config.replay = Some(ReplayConfig {
        input: fixture(),
        passes,
    });
    config
}

fn session_ids(infos: &[CamelSrtInfo]) -> Vec<Option<SessionId>> {
    infos.iter().map(|info| info.session_id()).collect()
}

fn delta(info: &CamelSrtInfo, category: SrtCategory) -> Option<Duration> {
    info.get(category).and_then(|r| r.delta_time)
}

#[test]
fn core_read_facts() {
    let messages = read_facts(fixture()).unwrap();
    assert_eq!(messages.len(), 18);
    assert_eq!(messages[0].role, Role::Begin);
    assert_eq!(messages[0].src_tid, 0x100);
    assert_eq!(messages[0].opcode, Some(0));
    assert_eq!(messages[10].role, Role::End);
    assert_eq!(messages[10].opcode, None);
    assert_eq!(messages[10].dst_tid, 0x100);
}

#[test]
fn core_replay_single_pass() {
    let mut infos = vec![];
    let mut runtime = Runtime::new(replay_config(false, 1), |info| infos.push(info.clone())).unwrap();
    let summary = runtime.run().unwrap();
    drop(runtime);

    assert_eq!(summary.nb_msgs, 18);
    assert_eq!(summary.nb_dialogues, 0);
    assert_eq!(
        session_ids(&infos),
        vec![
            Some(1),
            Some(1),
            Some(2),
            Some(2),
            Some(1),
            Some(1),
            Some(2),
            Some(1),
            Some(1),
            Some(1),
            Some(1),
            None,
            Some(3),
            Some(3),
            Some(3),
            Some(3),
            Some(3),
            Some(3),
        ]
    );

    // application context of the BEGIN is reported on the CONTINUE
    assert_eq!(
        infos[1].tcap.application_context.as_deref(),
        Some("0.4.0.0.1.0.50.1")
    );
    assert_eq!(
        delta(&infos[1], SrtCategory::VoiceInitialDp),
        Some(Duration::milliseconds(80))
    );
    assert_eq!(
        delta(&infos[5], SrtCategory::VoiceAcr1),
        Some(Duration::milliseconds(50))
    );
    assert!(infos[6].tcap.closed);
    assert_eq!(
        delta(&infos[6], SrtCategory::Session),
        Some(Duration::milliseconds(700))
    );
    assert!(infos[7].tcap.srt.is_duplicate);
    assert_eq!(
        delta(&infos[9], SrtCategory::VoiceDisconnect),
        Some(Duration::milliseconds(10))
    );
    assert_eq!(
        infos[10].tcap.srt.delta_time,
        Some(Duration::milliseconds(2_020))
    );
    assert!(infos[11].tcap.srt.is_unmatched());
    assert!(!infos[11].tcap.srt.request_available);

    let stats = &summary.stats;
    assert_eq!(stats.count(SrtCategory::VoiceInitialDp), 1);
    assert_eq!(stats.duplicates(SrtCategory::VoiceInitialDp), 1);
    assert_eq!(stats.count(SrtCategory::SmsInitialDp), 1);
    assert_eq!(stats.count(SrtCategory::VoiceAcr1), 1);
    assert_eq!(stats.count(SrtCategory::VoiceDisconnect), 1);
    assert_eq!(stats.count(SrtCategory::GprsInitialDp), 1);
    assert_eq!(stats.duplicates(SrtCategory::GprsInitialDp), 1);
    assert_eq!(stats.count(SrtCategory::GprsReport), 1);
    assert_eq!(stats.count(SrtCategory::Session), 5);
    assert_eq!(stats.duplicates(SrtCategory::Session), 1);
    assert_eq!(stats.unmatched(SrtCategory::Session), 1);
    assert_eq!(stats.max_micros(SrtCategory::GprsReport).map(|m| m / 1000), Some(20));
}

#[test]
fn core_replay_second_pass_idempotent() {
    let mut infos = vec![];
    let mut runtime = Runtime::new(replay_config(true, 2), |info| infos.push(info.clone())).unwrap();
    let summary = runtime.run().unwrap();
    drop(runtime);

    assert_eq!(summary.nb_msgs, 36);
    assert_eq!(summary.nb_passes, 2);
    assert_eq!(summary.nb_dialogues, 3);
    let (first, second) = infos.split_at(18);
    assert_eq!(session_ids(first), session_ids(second));
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.tcap.srt.is_duplicate, b.tcap.srt.is_duplicate);
        for category in [
            SrtCategory::VoiceInitialDp,
            SrtCategory::VoiceAcr1,
            SrtCategory::VoiceDisconnect,
            SrtCategory::GprsReport,
        ] {
            assert_eq!(delta(a, category), delta(b, category));
        }
    }
    assert_eq!(summary.stats.count(SrtCategory::Session), 5);
}

#[test]
fn core_replay_requires_input() {
    let config = default_config();
    assert!(Runtime::new(config, |_| ()).is_err());

    let mut config = replay_config(false, 1);
    config.replay = Some(ReplayConfig {
        input: format!("{}/tests/data/missing.csv", env!("CARGO_MANIFEST_DIR")),
        passes: 1,
    });
    let mut runtime = Runtime::new(config, |_| ()).unwrap();
    assert!(runtime.run().is_err());
}
