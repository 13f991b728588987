//! End-to-end: host events drive scanning, the status bar, persistence and
//! the generation interceptor over a chat file on disk.

use std::sync::Arc;

use serde_json::json;
use vhelas::prelude::*;
use vhelas::status::derive_status;

const CHAT: &str = concat!(
    r#"{"user_name":"You","character_name":"Narrator"}"#,
    "\n",
    r#"{"name":"Narrator","is_user":false,"mes":"You wake.<!--STATUS:[\"Cellar\",\"Night\",\"HP 12\"]--><!--SAVE:\"s1\"--><!--GAMESTART:true-->","variables":[{}]}"#,
    "\n",
    r#"{"name":"You","is_user":true,"mes":"climb the stairs","variables":[{"vhelas_status":["stale"]}]}"#,
    "\n",
    r#"{"name":"Narrator","is_user":false,"mes":"","swipe_id":1,"swipes":["Hall.<!--STATUS:[\"Hall\",\"Dawn\"]-->","Attic.<!--STATUS:[\"Attic\"]--><!--SAVE:\"s2\"-->"],"variables":[{},{}]}"#,
    "\n",
);

fn extension(settings: Settings) -> Arc<StatusLineExtension> {
    Arc::new(StatusLineExtension::new(settings).unwrap())
}

#[tokio::test]
async fn events_scan_render_persist_and_intercept() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("adventure.jsonl");
    tokio::fs::write(&path, CHAT).await.unwrap();

    let ext = extension(Settings::default());
    let bus = EventBus::standard(ext.clone());
    let sink = MemorySink::new();
    let saves = SaveFlag::new();

    // ── Chat opened ──
    let mut chat = ChatFile::load(&path).await.unwrap();
    let report = bus
        .dispatch(
            ChatEvent::ChatChanged,
            &mut HostContext::new(&mut chat.messages, &saves, &sink),
        )
        .unwrap();
    assert!(report.scan.modified);
    assert!(chat.flush(&saves).await.unwrap());

    // Active swipe of the last message wins: one element goes to the center.
    assert_eq!(report.status, StatusLine::new("", "Attic", ""));
    let rendered = sink.snapshot();
    assert_eq!(rendered.layout, SlotLayout::CenterOnly);
    assert_eq!(rendered.height, 1);

    // ── Persisted state ──
    let saved = ChatFile::load(&path).await.unwrap();
    let msgs = &saved.messages;
    assert_eq!(msgs[0].mes, "You wake.");
    assert_eq!(msgs[0].variables[0]["vhelas_status"], json!(["Cellar", "Night", "HP 12"]));
    assert_eq!(msgs[0].variables[0]["vhelas_gamestart"], json!(true));
    assert!(msgs[1].variables[0].is_empty());
    assert_eq!(msgs[2].mes, "Attic.");
    assert_eq!(msgs[2].swipes.as_ref().unwrap()[0], "Hall.");
    assert_eq!(msgs[2].variables[0]["vhelas_status"], json!(["Hall", "Dawn"]));
    assert_eq!(msgs[2].variables[1]["vhelas_save"], json!("s2"));
    assert_eq!(saved.header.as_ref().unwrap()["character_name"], "Narrator");

    // ── Nothing left to do ──
    let mut chat = saved.clone();
    let report = bus
        .dispatch(
            ChatEvent::MessageReceived,
            &mut HostContext::new(&mut chat.messages, &saves, &sink),
        )
        .unwrap();
    assert!(!report.scan.modified);
    assert!(!chat.flush(&saves).await.unwrap());

    // ── Generation ──
    let mut outbound = vec![
        ChatMessage::assistant(r#"echo <!--INPUT:"go north"-->"#),
        ChatMessage::user("go north"),
    ];
    let action = ext.intercept(&chat.messages, &mut outbound);
    assert_eq!(action, InterceptAction::Proceed);
    assert_eq!(outbound.len(), 3);
    assert_eq!(outbound[0].name.as_deref(), Some("Vhelas"));
    assert_eq!(outbound[0].mes, r#"<!--SAVE:"s2"-->"#);
    assert_eq!(outbound[1].mes, "echo");
}

#[tokio::test]
async fn swiping_back_changes_status_without_rescan_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("adventure.jsonl");
    tokio::fs::write(&path, CHAT).await.unwrap();

    let ext = extension(Settings::default());
    let bus = EventBus::standard(ext.clone());
    let sink = MemorySink::new();
    let saves = SaveFlag::new();

    let mut chat = ChatFile::load(&path).await.unwrap();
    bus.dispatch(
        ChatEvent::ChatChanged,
        &mut HostContext::new(&mut chat.messages, &saves, &sink),
    );

    // The host switches to the first swipe and updates the displayed text.
    let last = chat.messages.len() - 1;
    chat.messages[last].swipe_id = Some(0);
    chat.messages[last].mes = "Hall.".into();
    let report = bus
        .dispatch(
            ChatEvent::MessageSwiped,
            &mut HostContext::new(&mut chat.messages, &saves, &sink),
        )
        .unwrap();
    assert!(!report.scan.modified);
    assert_eq!(report.status, StatusLine::new("Hall", "", "Dawn"));
    assert_eq!(sink.snapshot().layout, SlotLayout::LeftRight);

    // Older saves are found when the active swipe carries none.
    let mut outbound = Vec::new();
    ext.intercept(&chat.messages, &mut outbound);
    assert_eq!(outbound[0].mes, r#"<!--SAVE:"s1"-->"#);
}

#[tokio::test]
async fn disabled_extension_leaves_file_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("adventure.jsonl");
    tokio::fs::write(&path, CHAT).await.unwrap();

    let ext = extension(Settings {
        enabled: false,
        ..Default::default()
    });
    let bus = EventBus::standard(ext.clone());
    let sink = MemorySink::new();
    let saves = SaveFlag::new();

    let mut chat = ChatFile::load(&path).await.unwrap();
    let report = bus
        .dispatch(
            ChatEvent::ChatChanged,
            &mut HostContext::new(&mut chat.messages, &saves, &sink),
        )
        .unwrap();
    assert!(report.status.is_empty());
    assert_eq!(sink.snapshot().height, 0);
    assert!(!chat.flush(&saves).await.unwrap());
    assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), CHAT);

    let mut outbound = vec![ChatMessage::user("hi")];
    assert_eq!(ext.intercept(&chat.messages, &mut outbound), InterceptAction::Proceed);
    assert_eq!(outbound.len(), 1);
}

#[test]
fn status_reads_only_validated_store_values() {
    let registry = TagRegistry::standard().unwrap();
    let mut newest = ChatMessage::assistant("later");
    newest.variables[0].insert("vhelas_status".into(), json!("not an array"));
    let mut older = ChatMessage::assistant("earlier");
    older.variables[0].insert("vhelas_status".into(), json!(["A", "B", "C"]));
    let line = derive_status(&registry, &[older, newest]);
    assert_eq!(line.to_string(), "A | B | C");
}
