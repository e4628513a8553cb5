//! Client data and connection state.

use crate::message::{Buffer, ReplyBuffer};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The stable identifier of a connection, for the lifetime of its session.
///
/// Plays the role a file descriptor plays in a poll loop: the registry keys
/// clients by it, and channels remember their members with it.
pub type ConnId = usize;

/// A block of rendered IRC messages, shared between the state and the
/// connection's writer task.
#[derive(Clone, Debug)]
pub struct MessageQueueItem(Arc<str>);

impl From<Buffer> for MessageQueueItem {
    fn from(val: Buffer) -> Self {
        Self(val.build().into())
    }
}

impl From<ReplyBuffer> for MessageQueueItem {
    fn from(val: ReplyBuffer) -> Self {
        Self(val.build().into())
    }
}

impl AsRef<str> for MessageQueueItem {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<[u8]> for MessageQueueItem {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

pub type MessageQueue = mpsc::UnboundedSender<MessageQueueItem>;

/// A state machine that tracks the registration progress of a connection.
///
/// A client that has sent neither NICK nor USER cannot join channels; one
/// that has sent both is checked against the server password and either
/// becomes `Registered` or is disconnected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Fresh,
    NickGiven,
    UserGiven,
    Registered,
}

impl Default for ConnectionState {
    fn default() -> ConnectionState {
        ConnectionState::Fresh
    }
}

impl ConnectionState {
    /// The state after a nickname has been set.
    pub fn with_nick(self) -> ConnectionState {
        match self {
            ConnectionState::Fresh => ConnectionState::NickGiven,
            other => other,
        }
    }

    /// The state after a username has been set.
    pub fn with_user(self) -> ConnectionState {
        match self {
            ConnectionState::Fresh => ConnectionState::UserGiven,
            other => other,
        }
    }

    pub fn is_registered(self) -> bool {
        self == ConnectionState::Registered
    }
}

const SOURCE_LENGTH: usize = 64;

/// Client data.
pub struct Client {
    /// The queue of messages to be sent to the client.
    ///
    /// This is the write end of a mpsc channel of messages (similar to go
    /// channels).  It is currently unbounded, so sending never blocks.
    queue: MessageQueue,

    state: ConnectionState,

    /// The host the client connected from, fixed at accept time.
    host: String,

    /// The last value given via PASS, checked when registration completes.
    password: String,

    nick: String,
    user: String,

    /// The cached `nick!user@host`.
    source: String,

    /// Names of the channels this client has joined.
    ///
    /// The member sets of those channels hold this client's id in return;
    /// both sides are updated together, through the state.
    pub channels: BTreeSet<String>,
}

impl Client {
    /// Initializes the data for a new client, given its message queue.
    ///
    /// The nickname is set to "*", as popular servers do until NICK is
    /// received.  The username is empty.
    pub fn new(queue: MessageQueue, host: String) -> Self {
        let mut res = Self {
            queue,
            state: ConnectionState::default(),
            host,
            password: String::new(),
            nick: String::from("*"),
            user: String::new(),
            source: String::with_capacity(SOURCE_LENGTH),
            channels: BTreeSet::new(),
        };
        res.update_source();
        res
    }

    /// Adds a message to the client's message queue.
    ///
    /// Use this function to send messages to the client.
    pub fn send(&self, msg: impl Into<MessageQueueItem>) {
        let _ = self.queue.send(msg.into());
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_registered(&self) -> bool {
        self.state.is_registered()
    }

    /// Marks the client as registered.  There is no way back.
    pub fn set_registered(&mut self) {
        self.state = ConnectionState::Registered;
    }

    /// Whether the client has both a nickname and a username, i.e. whether
    /// registration should be attempted.
    pub fn can_register(&self) -> bool {
        !self.is_registered() && self.nick != "*" && !self.user.is_empty()
    }

    /// The `nick!user@host` source of messages from this client.
    pub fn source(&self) -> &str {
        &self.source
    }

    fn update_source(&mut self) {
        self.source.clear();
        let _ = write!(self.source, "{}!{}@{}", self.nick, self.user, self.host);
    }

    /// The nickname of the client, `*` if it has not been set.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn set_nick(&mut self, nick: &str) {
        self.nick.clear();
        self.nick.push_str(nick);
        self.state = self.state.with_nick();
        self.update_source();
    }

    /// The username of the client.
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn set_user(&mut self, user: &str) {
        self.user.clear();
        self.user.push_str(user);
        self.state = self.state.with_user();
        self.update_source();
    }

    /// The host of the client.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The last password given via PASS, the empty string otherwise.
    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn set_password(&mut self, password: &str) {
        self.password.clear();
        self.password.push_str(password);
    }
}
