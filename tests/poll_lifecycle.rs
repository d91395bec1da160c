//! End-to-end poll lifecycle
//!
//! Drives chat messages through the ingestion loop, handler and engine
//! against an in-memory store and a transport that records every post.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use votebot::channels::{
    ChannelEvent, ChannelResult, ChatTransport, Connection, IncomingMessage, MessageHandler,
    OutgoingMessage,
};
use votebot::config::IngestConfig;
use votebot::messages::{InboundLoop, PollMessageHandler};
use votebot::polls::{
    parse_command, CommandError, MemoryPollStore, PollCommand, PollEngine, PollError,
};

/// Transport that records posts and serves one scripted connection
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<OutgoingMessage>>,
    events: Mutex<Option<VecDeque<IncomingMessage>>>,
}

impl RecordingTransport {
    fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().clone()
    }

    fn last(&self) -> OutgoingMessage {
        self.sent.lock().last().cloned().expect("no message sent")
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn connect(&self) -> ChannelResult<Box<dyn Connection>> {
        let events = self.events.lock().take();
        match events {
            Some(events) => Ok(Box::new(ScriptedConnection { events })),
            None => std::future::pending().await,
        }
    }

    async fn send_message(&self, message: OutgoingMessage) -> ChannelResult<String> {
        let mut sent = self.sent.lock();
        sent.push(message);
        Ok(format!("bot-post-{}", sent.len()))
    }

    fn self_user_id(&self) -> Option<String> {
        Some("bot".to_string())
    }
}

struct ScriptedConnection {
    events: VecDeque<IncomingMessage>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn next_event(&mut self) -> Option<ChannelResult<ChannelEvent>> {
        match self.events.pop_front() {
            Some(message) => Some(Ok(ChannelEvent::Posted(message))),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> ChannelResult<()> {
        Ok(())
    }
}

fn post(id: &str, sender: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        id: id.to_string(),
        chat_id: "town-square".to_string(),
        sender_id: sender.to_string(),
        text: text.to_string(),
        root_id: None,
    }
}

fn setup() -> (PollMessageHandler, Arc<RecordingTransport>, Arc<MemoryPollStore>) {
    let store = Arc::new(MemoryPollStore::new());
    let engine = Arc::new(PollEngine::new(store.clone()));
    let transport = Arc::new(RecordingTransport::default());
    let handler = PollMessageHandler::new(engine, transport.clone());
    (handler, transport, store)
}

/// Poll ID from a creation announcement (`📊 *Poll #<id>*`)
fn announced_id(text: &str) -> String {
    let start = text.find("#").expect("no poll id") + 1;
    let end = text[start..].find('*').expect("unterminated poll id") + start;
    text[start..end].to_string()
}

#[tokio::test]
async fn test_full_lifecycle_through_handler() {
    let (handler, transport, store) = setup();

    handler
        .handle_message(post("m1", "u1", "/vote create Color?, Red, Blue"))
        .await;
    let created = transport.last();
    assert_eq!(created.reply_to, None);
    let poll_id = announced_id(&created.text);
    assert_eq!(poll_id.len(), 32);

    handler
        .handle_message(post("m2", "u2", &format!("/vote send {} 2", poll_id)))
        .await;
    let confirmation = transport.last();
    assert_eq!(confirmation.reply_to.as_deref(), Some("m2"));
    assert!(confirmation.text.contains("*Blue*"));

    handler
        .handle_message(post("m3", "u1", &format!("/vote result {}", poll_id)))
        .await;
    let results = transport.last();
    assert_eq!(results.reply_to, None);
    assert!(results.text.contains("1. Red - 0 vote(s)"));
    assert!(results.text.contains("2. Blue - 1 vote(s)"));

    handler
        .handle_message(post("m4", "u2", &format!("/vote send {} 1", poll_id)))
        .await;
    assert!(transport.last().text.contains("already voted"));

    handler
        .handle_message(post("m5", "u2", &format!("/vote close {}", poll_id)))
        .await;
    assert!(transport.last().text.contains("only the poll creator"));

    handler
        .handle_message(post("m6", "u1", &format!("/vote close {}", poll_id)))
        .await;
    let closed = transport.last();
    assert_eq!(closed.reply_to, None);
    assert_eq!(closed.text, format!("✅ Poll #{} is closed!", poll_id));

    handler
        .handle_message(post("m7", "u3", &format!("/vote send {} 1", poll_id)))
        .await;
    assert!(transport.last().text.contains("closed"));

    handler
        .handle_message(post("m8", "u1", &format!("/vote delete {}", poll_id)))
        .await;
    let deleted = transport.last();
    assert_eq!(deleted.reply_to.as_deref(), Some("m8"));
    assert!(store.is_empty());

    handler
        .handle_message(post("m9", "u1", &format!("/vote result {}", poll_id)))
        .await;
    assert!(transport.last().text.contains("not found"));

    assert_eq!(transport.sent().len(), 9);
}

#[tokio::test]
async fn test_engine_scenario() {
    let store = Arc::new(MemoryPollStore::new());
    let engine = PollEngine::new(store);

    let poll = engine
        .create_poll("Color?", vec!["Red".into(), "Blue".into()], "u1")
        .await
        .unwrap();
    let id = poll.id.clone();

    let fetched = engine.get_poll(&id).await.unwrap();
    assert_eq!(fetched.question, "Color?");
    assert_eq!(fetched.options, vec!["Red".to_string(), "Blue".to_string()]);
    assert_eq!(fetched.creator_id, "u1");
    assert!(!fetched.closed);
    assert!(fetched.ballots.is_empty());

    let receipt = engine.cast_vote(&id, "u2", 2).await.unwrap();
    assert_eq!(receipt.label, "Blue");

    let results = engine.get_results(&id).await.unwrap();
    assert_eq!(results.votes_for("Red"), Some(0));
    assert_eq!(results.votes_for("Blue"), Some(1));

    assert!(matches!(
        engine.cast_vote(&id, "u2", 1).await,
        Err(PollError::AlreadyVoted)
    ));
    assert!(matches!(
        engine.close_poll(&id, "u2").await,
        Err(PollError::Forbidden)
    ));
    assert!(engine.close_poll(&id, "u1").await.unwrap().closed);
    assert!(engine.close_poll(&id, "u1").await.unwrap().closed);
    assert!(matches!(
        engine.cast_vote(&id, "u3", 1).await,
        Err(PollError::PollClosed)
    ));

    engine.delete_poll(&id, "u1").await.unwrap();
    assert!(matches!(
        engine.get_poll(&id).await,
        Err(PollError::NotFound(_))
    ));
}

#[test]
fn test_parser_scenario() {
    assert!(matches!(
        parse_command("/vote create Q, A"),
        Err(CommandError::Malformed { .. })
    ));
    assert!(matches!(
        parse_command("/vote send 12345 x"),
        Err(CommandError::Malformed { .. })
    ));
    assert_eq!(
        parse_command("/vote result 12345").unwrap(),
        Some(PollCommand::Result {
            poll_id: "12345".to_string()
        })
    );
}

#[tokio::test]
async fn test_ingestion_loop_serves_commands() {
    let store = Arc::new(MemoryPollStore::new());
    let engine = Arc::new(PollEngine::new(store.clone()));
    let transport = Arc::new(RecordingTransport::default());
    *transport.events.lock() = Some(VecDeque::from([
        post("m1", "u1", "/vote create Lunch?, Pizza, Sushi"),
        post("m2", "bot", "/vote help"),
        post("m3", "u2", "nice weather"),
        post("m4", "u2", "/vote help"),
    ]));

    let handler = Arc::new(PollMessageHandler::new(engine, transport.clone()));
    let inbound = InboundLoop::new(transport.clone(), handler, IngestConfig::default());

    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(async move { inbound.run(rx).await });

    for _ in 0..500 {
        if transport.sent().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop did not stop")
        .unwrap();

    let sent = transport.sent();
    assert_eq!(sent.len(), 2, "bot's own post and chatter get no reply");
    assert_eq!(store.len(), 1);
    assert!(sent.iter().any(|m| m.text.contains("*Lunch?*")));
    assert!(sent
        .iter()
        .any(|m| m.reply_to.as_deref() == Some("m4") && m.text.contains("/vote help")));
}

#[tokio::test]
async fn test_concurrent_votes_through_handler_are_all_counted() {
    let store = Arc::new(MemoryPollStore::new());
    let engine = Arc::new(PollEngine::new(store));
    let transport = Arc::new(RecordingTransport::default());
    let handler = Arc::new(PollMessageHandler::new(engine.clone(), transport.clone()));

    let poll = engine
        .create_poll("Q", vec!["A".into(), "B".into()], "u0")
        .await
        .unwrap();

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let handler = handler.clone();
            let text = format!("/vote send {} {}", poll.id, i % 2 + 1);
            tokio::spawn(async move {
                handler
                    .handle_message(post(&format!("m{}", i), &format!("voter{}", i), &text))
                    .await;
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let results = engine.get_results(&poll.id).await.unwrap();
    assert_eq!(results.total_votes, 20);
    assert_eq!(results.votes_for("A"), Some(10));
    assert_eq!(results.votes_for("B"), Some(10));
}
