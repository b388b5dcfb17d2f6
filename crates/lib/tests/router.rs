//! Message router behavior against in-process fakes.

mod support;

use relay::llm::{ChatMessage, ContentPart, MessageContent};
use relay::router::{Outcome, IMAGE_APOLOGY};
use relay::session::{Role, Turn, IMAGE_PLACEHOLDER};
use support::{
    default_harness, harness, image_event, text_event, FakeMedia, RecordingChannel,
    ScriptedBackend, Sent, SYSTEM,
};

#[tokio::test]
async fn first_text_from_new_user_is_answered_and_marked_read() {
    let h = harness(
        ScriptedBackend::with_replies(vec![Ok("Hi there!")]),
        FakeMedia::unavailable(),
        RecordingChannel::default(),
    );

    let outcome = h.router.handle(text_event("U1", "wamid.1", "Hello")).await;

    assert_eq!(outcome, Outcome::Replied);
    assert_eq!(
        h.store.history("U1").await,
        vec![Turn::user("Hello"), Turn::assistant("Hi there!")]
    );
    assert_eq!(
        h.channel.sent(),
        vec![
            Sent::Reply {
                destination: "PN1".into(),
                to: "U1".into(),
                text: "Hi there!".into(),
                reply_to: "wamid.1".into(),
            },
            Sent::Read {
                destination: "PN1".into(),
                message_id: "wamid.1".into(),
            },
        ]
    );
    let requests = h.backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "text-model");
    assert_eq!(
        requests[0].1,
        vec![
            ChatMessage::text(Role::System, SYSTEM),
            ChatMessage::text(Role::User, "Hello"),
        ]
    );
}

#[tokio::test]
async fn text_requests_carry_a_bounded_window_of_recent_turns() {
    let h = default_harness();

    for k in 1..=15 {
        let outcome = h
            .router
            .handle(text_event("U1", &format!("wamid.{}", k), &format!("msg {}", k)))
            .await;
        assert_eq!(outcome, Outcome::Replied);
    }

    let requests = h.backend.requests();
    assert_eq!(requests.len(), 15);
    for (i, (_, messages)) in requests.iter().enumerate() {
        let k = i + 1;
        let expected_turns = (2 * k - 1).min(20);
        assert_eq!(messages.len(), expected_turns + 1, "event {}", k);
        assert_eq!(messages[0], ChatMessage::text(Role::System, SYSTEM));
        // the newest turn is always the user message being answered
        assert_eq!(
            messages.last(),
            Some(&ChatMessage::text(Role::User, format!("msg {}", k)))
        );
        // user and assistant turns alternate
        for pair in messages[1..].windows(2) {
            assert_ne!(pair[0].role, pair[1].role);
        }
    }

    // 29 turns stored before the 15th request; the window starts at the reply to msg 5
    let last = &requests[14].1;
    assert_eq!(last[1], ChatMessage::text(Role::Assistant, "reply 5"));
    assert_eq!(last[2], ChatMessage::text(Role::User, "msg 6"));
    assert_eq!(h.store.history("U1").await.len(), 30);
}

#[tokio::test]
async fn text_generation_failure_sends_nothing_and_keeps_user_turn() {
    let h = harness(
        ScriptedBackend::with_replies(vec![Err("429 quota exceeded"), Ok("better now")]),
        FakeMedia::unavailable(),
        RecordingChannel::default(),
    );

    let outcome = h.router.handle(text_event("U1", "wamid.1", "first")).await;
    assert_eq!(outcome, Outcome::Unanswered);
    assert_eq!(h.store.history("U1").await, vec![Turn::user("first")]);
    assert!(h.channel.sent().is_empty());

    let outcome = h.router.handle(text_event("U1", "wamid.2", "second")).await;
    assert_eq!(outcome, Outcome::Replied);
    let requests = h.backend.requests();
    assert_eq!(
        requests[1].1[1..],
        [
            ChatMessage::text(Role::User, "first"),
            ChatMessage::text(Role::User, "second"),
        ]
    );
}

#[tokio::test]
async fn image_is_described_and_replied_without_read_ack() {
    let h = harness(
        ScriptedBackend::with_replies(vec![Ok("A cat on a sofa.")]),
        FakeMedia::serving("image/jpeg", b"hi"),
        RecordingChannel::default(),
    );

    let outcome = h.router.handle(image_event("U1", "wamid.9", "MEDIA1")).await;

    assert_eq!(outcome, Outcome::Replied);
    assert_eq!(h.media.resolved.lock().unwrap().clone(), vec!["MEDIA1".to_string()]);
    assert_eq!(
        h.store.history("U1").await,
        vec![Turn::user(IMAGE_PLACEHOLDER), Turn::assistant("A cat on a sofa.")]
    );
    assert_eq!(
        h.channel.sent(),
        vec![Sent::Reply {
            destination: "PN1".into(),
            to: "U1".into(),
            text: "A cat on a sofa.".into(),
            reply_to: "wamid.9".into(),
        }]
    );

    let requests = h.backend.requests();
    assert_eq!(requests[0].0, "vision-model");
    let messages = &requests[0].1;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
    match &messages[0].content {
        MessageContent::Parts(parts) => {
            assert!(matches!(&parts[0], ContentPart::Text { .. }));
            match &parts[1] {
                ContentPart::ImageUrl { image_url } => {
                    assert_eq!(image_url.url, "data:image/jpeg;base64,aGk=")
                }
                other => panic!("expected image part, got {:?}", other),
            }
        }
        other => panic!("expected parts, got {:?}", other),
    }
}

#[tokio::test]
async fn image_media_failure_replies_with_apology_and_records_both_turns() {
    let h = harness(
        ScriptedBackend::default(),
        FakeMedia::unavailable(),
        RecordingChannel::default(),
    );

    let outcome = h.router.handle(image_event("U1", "wamid.3", "MEDIA404")).await;

    assert_eq!(outcome, Outcome::RepliedWithError);
    assert!(h.backend.requests().is_empty());
    assert_eq!(
        h.store.history("U1").await,
        vec![Turn::user(IMAGE_PLACEHOLDER), Turn::assistant(IMAGE_APOLOGY)]
    );
    assert!(matches!(
        h.channel.sent().as_slice(),
        [Sent::Reply { text, reply_to, .. }] if text == IMAGE_APOLOGY && reply_to == "wamid.3"
    ));
}

#[tokio::test]
async fn image_generation_failure_replies_with_apology() {
    let h = harness(
        ScriptedBackend::with_replies(vec![Err("500 upstream")]),
        FakeMedia::serving("image/png", &[7]),
        RecordingChannel::default(),
    );

    let outcome = h.router.handle(image_event("U1", "wamid.4", "MEDIA2")).await;

    assert_eq!(outcome, Outcome::RepliedWithError);
    assert_eq!(h.store.history("U1").await.len(), 2);
    assert_eq!(h.channel.sent().len(), 1);
}

#[tokio::test]
async fn image_turns_are_part_of_later_text_context() {
    let h = default_harness();
    h.router.handle(image_event("U1", "wamid.1", "M")).await;
    h.router.handle(text_event("U1", "wamid.2", "what was that?")).await;

    let requests = h.backend.requests();
    let text_request = &requests[1].1;
    assert_eq!(text_request[1], ChatMessage::text(Role::User, IMAGE_PLACEHOLDER));
    assert_eq!(text_request[2], ChatMessage::text(Role::Assistant, "reply 1"));
}

#[tokio::test]
async fn unsupported_types_are_ack_only() {
    let h = default_harness();
    let mut event = text_event("U1", "wamid.5", "");
    event.content = relay::channels::Content::Other("audio".into());

    assert_eq!(h.router.handle(event).await, Outcome::AckOnly);
    assert!(h.store.is_empty().await);
    assert!(h.channel.sent().is_empty());
    assert!(h.backend.requests().is_empty());
}

#[tokio::test]
async fn send_failures_do_not_undo_history() {
    let h = harness(
        ScriptedBackend::with_replies(vec![Ok("answer")]),
        FakeMedia::unavailable(),
        RecordingChannel::failing(),
    );

    let outcome = h.router.handle(text_event("U1", "wamid.1", "q")).await;

    assert_eq!(outcome, Outcome::Replied);
    assert_eq!(
        h.store.history("U1").await,
        vec![Turn::user("q"), Turn::assistant("answer")]
    );
    // no read receipt for a reply that never arrived
    assert!(matches!(
        h.channel.sent().as_slice(),
        [Sent::Reply { reply_to, .. }] if reply_to == "wamid.1"
    ));
}

#[tokio::test]
async fn users_do_not_share_history() {
    let h = default_harness();
    h.router.handle(text_event("A", "wamid.a", "from a")).await;
    h.router.handle(text_event("B", "wamid.b", "from b")).await;

    let requests = h.backend.requests();
    assert_eq!(requests[1].1.len(), 2);
    assert_eq!(requests[1].1[1], ChatMessage::text(Role::User, "from b"));
}
