//! Test helpers for integration tests.
//!
//! Provides an in-memory [`Platform`] and a [`FeedSource`] serving canned
//! documents, plus helpers to build feed documents.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::{Notify, Semaphore};

use threadslapper::platform::{
    Channel, ChannelKind, Message, MessageRef, OutgoingMessage, Platform, ThreadHandle,
};
use threadslapper::{FeedSource, RawDocument, Result, SlapperError};

/// Guild every channel of [`MemoryPlatform`] belongs to.
pub const GUILD_ID: u64 = 1;

/// Platform operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    GetChannel,
    ListThreads,
    SendMessage,
    StartThread,
    CreateForumPost,
    JoinThread,
    PinMessage,
    Crosspost,
    LastMessage,
    RoleMembers,
    AddThreadMember,
}

#[derive(Default)]
struct State {
    next_id: u64,
    channels: HashMap<u64, Channel>,
    /// (parent channel, thread)
    threads: Vec<(u64, ThreadHandle)>,
    messages: HashMap<u64, Vec<Message>>,
    sent: Vec<(u64, OutgoingMessage)>,
    pins: Vec<MessageRef>,
    crossposts: Vec<MessageRef>,
    joined: Vec<u64>,
    roles: HashMap<(u64, u64), Vec<u64>>,
    thread_members: HashMap<u64, Vec<u64>>,
    failing: HashSet<Op>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        10_000 + self.next_id
    }

    fn check(&self, op: Op) -> Result<()> {
        if self.failing.contains(&op) {
            Err(SlapperError::Platform(format!("{:?} failed", op)))
        } else {
            Ok(())
        }
    }

    fn push_message(&mut self, channel_id: u64, id: u64, content: &str) -> Message {
        let message = Message {
            id,
            channel_id,
            content: content.to_string(),
        };
        self.messages
            .entry(channel_id)
            .or_default()
            .push(message.clone());
        message
    }
}

/// In-memory messaging platform.
#[derive(Default)]
pub struct MemoryPlatform {
    state: Mutex<State>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(&self, id: u64, name: &str, kind: ChannelKind) {
        self.state.lock().unwrap().channels.insert(
            id,
            Channel {
                id,
                name: name.to_string(),
                guild_id: Some(GUILD_ID),
                kind,
            },
        );
    }

    pub fn add_text_channel(&self, id: u64, name: &str) {
        self.add_channel(id, name, ChannelKind::Linear);
    }

    pub fn add_forum_channel(&self, id: u64, name: &str) {
        self.add_channel(id, name, ChannelKind::Forum);
    }

    /// Add an active thread under `parent`.
    pub fn add_thread(&self, parent: u64, id: u64, name: &str) {
        self.state.lock().unwrap().threads.push((
            parent,
            ThreadHandle {
                id,
                name: name.to_string(),
                guild_id: Some(GUILD_ID),
                starting_message: None,
            },
        ));
    }

    /// Post a message as someone else.
    pub fn post(&self, channel_id: u64, content: &str) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.push_message(channel_id, id, content);
    }

    pub fn set_role_members(&self, role_id: u64, members: &[u64]) {
        self.state
            .lock()
            .unwrap()
            .roles
            .insert((GUILD_ID, role_id), members.to_vec());
    }

    pub fn fail(&self, op: Op) {
        self.state.lock().unwrap().failing.insert(op);
    }

    pub fn threads(&self, parent: u64) -> Vec<ThreadHandle> {
        self.state
            .lock()
            .unwrap()
            .threads
            .iter()
            .filter(|(p, _)| *p == parent)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn messages(&self, channel_id: u64) -> Vec<Message> {
        self.state
            .lock()
            .unwrap()
            .messages
            .get(&channel_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Everything sent through [`Platform::send_message`] into `channel_id`.
    pub fn sent_to(&self, channel_id: u64) -> Vec<OutgoingMessage> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(c, _)| *c == channel_id)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn pins(&self) -> Vec<MessageRef> {
        self.state.lock().unwrap().pins.clone()
    }

    pub fn crossposts(&self) -> Vec<MessageRef> {
        self.state.lock().unwrap().crossposts.clone()
    }

    pub fn joined(&self) -> Vec<u64> {
        self.state.lock().unwrap().joined.clone()
    }

    pub fn thread_members(&self, thread_id: u64) -> Vec<u64> {
        self.state
            .lock()
            .unwrap()
            .thread_members
            .get(&thread_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Platform for MemoryPlatform {
    async fn get_channel(&self, id: u64) -> Result<Option<Channel>> {
        let state = self.state.lock().unwrap();
        state.check(Op::GetChannel)?;
        Ok(state.channels.get(&id).cloned())
    }

    async fn list_threads(&self, channel: &Channel) -> Result<Vec<ThreadHandle>> {
        self.state.lock().unwrap().check(Op::ListThreads)?;
        Ok(self.threads(channel.id))
    }

    async fn send_message(&self, channel_id: u64, message: &OutgoingMessage) -> Result<Message> {
        let mut state = self.state.lock().unwrap();
        state.check(Op::SendMessage)?;
        let known = state.channels.contains_key(&channel_id)
            || state.threads.iter().any(|(_, t)| t.id == channel_id);
        if !known {
            return Err(SlapperError::Platform(format!(
                "unknown channel {}",
                channel_id
            )));
        }
        let id = state.next_id();
        state.sent.push((channel_id, message.clone()));
        Ok(state.push_message(channel_id, id, &message.content))
    }

    async fn start_thread(
        &self,
        channel: &Channel,
        message_id: u64,
        name: &str,
        _reason: &str,
    ) -> Result<ThreadHandle> {
        let mut state = self.state.lock().unwrap();
        state.check(Op::StartThread)?;
        let thread = ThreadHandle {
            id: state.next_id(),
            name: name.to_string(),
            guild_id: channel.guild_id,
            starting_message: Some(MessageRef {
                channel_id: channel.id,
                message_id,
            }),
        };
        state.threads.push((channel.id, thread.clone()));
        Ok(thread)
    }

    async fn create_forum_post(
        &self,
        channel: &Channel,
        name: &str,
        message: &OutgoingMessage,
        _reason: &str,
    ) -> Result<ThreadHandle> {
        let mut state = self.state.lock().unwrap();
        state.check(Op::CreateForumPost)?;
        let id = state.next_id();
        state.sent.push((id, message.clone()));
        state.push_message(id, id, &message.content);
        let thread = ThreadHandle {
            id,
            name: name.to_string(),
            guild_id: channel.guild_id,
            starting_message: Some(MessageRef {
                channel_id: id,
                message_id: id,
            }),
        };
        state.threads.push((channel.id, thread.clone()));
        Ok(thread)
    }

    async fn join_thread(&self, thread_id: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check(Op::JoinThread)?;
        state.joined.push(thread_id);
        Ok(())
    }

    async fn pin_message(&self, message: MessageRef) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check(Op::PinMessage)?;
        state.pins.push(message);
        Ok(())
    }

    async fn crosspost_message(&self, message: MessageRef) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check(Op::Crosspost)?;
        state.crossposts.push(message);
        Ok(())
    }

    async fn last_message(&self, channel_id: u64) -> Result<Option<Message>> {
        let state = self.state.lock().unwrap();
        state.check(Op::LastMessage)?;
        Ok(state
            .messages
            .get(&channel_id)
            .and_then(|messages| messages.last().cloned()))
    }

    async fn role_members(&self, guild_id: u64, role_id: u64) -> Result<Vec<u64>> {
        let state = self.state.lock().unwrap();
        state.check(Op::RoleMembers)?;
        Ok(state
            .roles
            .get(&(guild_id, role_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn add_thread_member(&self, thread_id: u64, user_id: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.check(Op::AddThreadMember)?;
        state
            .thread_members
            .entry(thread_id)
            .or_default()
            .push(user_id);
        Ok(())
    }
}

/// Feed source serving canned documents by URI.
#[derive(Default)]
pub struct StaticFeedSource {
    documents: Mutex<HashMap<String, RawDocument>>,
    fetches: Mutex<Vec<String>>,
}

impl StaticFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `document` for `uri`, replacing any previous one.
    pub fn set(&self, uri: &str, document: RawDocument) {
        self.documents
            .lock()
            .unwrap()
            .insert(uri.to_string(), document);
    }

    /// Make fetches of `uri` fail.
    pub fn remove(&self, uri: &str) {
        self.documents.lock().unwrap().remove(uri);
    }

    /// How often `uri` was fetched.
    pub fn fetch_count(&self, uri: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == uri)
            .count()
    }
}

#[async_trait]
impl FeedSource for StaticFeedSource {
    async fn fetch(&self, uri: &str) -> Result<RawDocument> {
        self.fetches.lock().unwrap().push(uri.to_string());
        self.documents
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| SlapperError::Fetch(format!("{}: HTTP 404", uri)))
    }
}

/// Feed source whose fetches wait until [`GatedFeedSource::release`] is
/// called once per fetch.
pub struct GatedFeedSource {
    inner: StaticFeedSource,
    entered: Notify,
    gate: Semaphore,
}

impl GatedFeedSource {
    pub fn new() -> Self {
        Self {
            inner: StaticFeedSource::new(),
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    pub fn set(&self, uri: &str, document: RawDocument) {
        self.inner.set(uri, document);
    }

    /// Wait until a fetch is blocked on the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let one blocked fetch continue.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl FeedSource for GatedFeedSource {
    async fn fetch(&self, uri: &str) -> Result<RawDocument> {
        self.entered.notify_one();
        self.gate
            .acquire()
            .await
            .map_err(|e| SlapperError::Fetch(e.to_string()))?
            .forget();
        self.inner.fetch(uri).await
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected a JSON object"),
    }
}

/// Podcast document whose newest entry is episode `number` titled `title`.
pub fn podcast(number: i64, title: &str) -> RawDocument {
    RawDocument {
        metadata: object(json!({
            "title": "The Show",
            "link": "https://example.com",
            "image": {"href": "https://example.com/cover.png"},
            "published": "Tue, 10 Jun 2025 04:00:00 GMT",
        })),
        entries: vec![
            object(json!({
                "title": title,
                "itunes_episode": number.to_string(),
                "summary": "<p>First paragraph.</p><p>Second paragraph.</p>",
                "link": format!("https://example.com/{}", number),
                "image": {"href": format!("https://example.com/{}.png", number)},
                "tags": [{"term": "tech"}, {"term": "news"}],
            })),
            object(json!({
                "title": "Older",
                "itunes_episode": (number - 1).to_string(),
                "summary": "old",
                "link": "https://example.com/old",
            })),
        ],
    }
}

/// Document without entries.
pub fn empty_podcast() -> RawDocument {
    RawDocument {
        metadata: object(json!({"title": "The Show"})),
        entries: vec![],
    }
}
