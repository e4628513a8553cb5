//! Shared state and API to handle incoming commands.
//!
//! This module is split in two files:
//!
//! - `mod.rs`: public API of the server state, the dispatch pipeline and
//!   send utilities
//! - `commands.rs`: one handler per supported command

use crate::bot::Bot;
use crate::channel::{Channel, Departure};
use crate::client::{Client, ConnId, MessageQueue, MessageQueueItem};
use crate::config::StateConfig;
use crate::lines;
use crate::message::{Buffer, Command, Message, ReplyBuffer, rpl};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;
use tokio::sync::Mutex;

mod commands;

const MAX_CHANNEL_NAME_LENGTH: usize = 31;
const MAX_NICKNAME_LENGTH: usize = 9;

/// Hard cap on the number of live channels; JOINs that would create more
/// are refused with ERR_UNAVAILRESOURCE.
const MAX_CHANNELS: usize = 50;

/// The result of a command handler.
///
/// `Err(())` means the connection has been torn down and no further input
/// from it must be processed.
type HandlerResult = Result<(), ()>;

struct CommandContext<'a> {
    id: ConnId,
    rb: &'a mut ReplyBuffer,
}

/// State of an IRC server.
///
/// This is used by tern to maintain a consistent view of the network.  Note
/// that this is just an `Arc` to the real data, so it's cheap to clone and
/// clones share the same data.
///
/// Locking the whole state once per incoming message realizes the exclusive
/// section the command handlers rely on: a command's side effects span the
/// client, nickname and channel indices and must be observed atomically.
///
/// # Example
///
/// ```rust
/// # use tern::State;
/// # use tern::config::StateConfig;
/// # use tern::message::Message;
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let state = State::new(StateConfig {
///     domain: "tern.localdomain".to_owned(),
///     password: "chirp".to_owned(),
/// });
///
/// // The acceptor gives each connection a queue; the state pushes the
/// // messages meant to be sent back onto it.
/// let (queue, mut outgoing) = tokio::sync::mpsc::unbounded_channel();
/// let id = state.peer_joined("127.0.0.1".to_owned(), queue).await;
///
/// state.handle_message(id, Message::parse("PASS chirp\r\n").unwrap()).await;
/// state.handle_message(id, Message::parse("NICK ser\r\n").unwrap()).await;
/// state.handle_message(id, Message::parse("USER ser 0 * :ser\r\n").unwrap()).await;
///
/// // The client registered, so the state pushed the welcome onto the queue.
/// let msg = outgoing.recv().await.unwrap();
/// let msg: &str = msg.as_ref();
/// assert_eq!(msg, ":tern.localdomain 001 ser \
/// :Welcome to the tern.localdomain Network, ser\r\n");
/// # });
/// ```
#[derive(Clone)]
pub struct State(Arc<Mutex<StateInner>>);

impl State {
    /// Initializes the server state from the given configuration.
    pub fn new(config: StateConfig) -> Self {
        Self(Arc::new(Mutex::new(StateInner::new(config))))
    }

    /// Adds a new connection to the state and returns its identifier.
    ///
    /// The queue is used to push messages back to the peer.
    pub async fn peer_joined(&self, host: String, queue: MessageQueue) -> ConnId {
        self.0.lock().await.peer_joined(host, queue)
    }

    /// Removes the given connection from the state, with an optional error.
    ///
    /// If the peer quit unexpectedly, `err` should reflect the cause, so
    /// that other peers can be informed.
    pub async fn peer_quit(&self, id: ConnId, err: Option<io::Error>) {
        self.0.lock().await.peer_quit(id, err);
    }

    /// Updates the state according to the given message from the given
    /// client.
    ///
    /// Returns false when the connection has been torn down and buffered
    /// input from it must be discarded.
    pub async fn handle_message(&self, id: ConnId, msg: Message<'_>) -> bool {
        self.0.lock().await.handle_message(id, msg)
    }

    /// Installs the channel bot collaborator.
    pub async fn set_bot(&self, bot: Box<dyn Bot>) {
        self.0.lock().await.bot = Some(bot);
    }
}

/// The actual data of the IRC server.
pub(crate) struct StateInner {
    /// The domain of the server.  Used as the prefix of replies.
    domain: String,

    /// The connection password clients must supply to register.
    password: String,

    /// The set of clients, keyed by connection id.
    clients: HashMap<ConnId, Client>,

    /// Nickname index: lowercased nickname to connection id.
    ///
    /// The `*` placeholder is never indexed.  Uniqueness of nicknames is
    /// enforced on the lowercased form.
    nicks: HashMap<String, ConnId>,

    /// The set of channels, keyed by name.
    channels: HashMap<String, Channel>,

    /// The optional channel bot, consulted for channel messages starting
    /// with `!`.
    bot: Option<Box<dyn Bot>>,

    /// The identifier handed to the next connection.
    next_id: ConnId,
}

impl StateInner {
    pub fn new(config: StateConfig) -> Self {
        Self {
            domain: config.domain,
            password: config.password,
            clients: HashMap::new(),
            nicks: HashMap::new(),
            channels: HashMap::new(),
            bot: None,
            next_id: 0,
        }
    }

    pub fn peer_joined(&mut self, host: String, queue: MessageQueue) -> ConnId {
        let id = self.next_id;
        self.next_id += 1;
        log::debug!("{}: Connected from {}", id, host);
        self.clients.insert(id, Client::new(queue, host));
        id
    }

    pub fn peer_quit(&mut self, id: ConnId, err: Option<io::Error>) {
        if !self.clients.contains_key(&id) {
            return;
        }
        log::debug!("{}: Disconnected", id);
        let mut reason = String::from("Quit: ");
        match err {
            Some(err) => reason.push_str(&err.to_string()),
            None => reason.push_str(lines::QUIT_DEFAULT),
        }
        self.remove_client(id, &reason);
    }

    /// Does the various cleanups needed when a client leaves the server:
    ///
    /// - remove the client from the client and nickname indices,
    /// - send a QUIT message to all clients that share a channel with it,
    /// - remove the client from each channel it was in, promoting a new
    ///   operator where needed,
    /// - remove channels that become empty.
    fn remove_client(&mut self, id: ConnId, reason: &str) {
        let client = match self.clients.remove(&id) {
            Some(client) => client,
            None => return,
        };
        if client.nick() != "*" {
            self.nicks.remove(&client.nick().to_ascii_lowercase());
        }

        let mut response = Buffer::new();
        response.message(client.source(), Command::Quit).trailing_param(reason);
        let msg = MessageQueueItem::from(response);

        let mut noticed = HashSet::new();
        for name in &client.channels {
            if let Some(channel) = self.channels.get(name) {
                noticed.extend(channel.members());
            }
        }
        noticed.remove(&id);
        for member in noticed {
            self.send(member, msg.clone());
        }

        for name in &client.channels {
            self.remove_from_channel(name, id, client.nick());
        }
    }

    /// Removes a member from a channel, emitting the departure notice and,
    /// when the last operator left, the promotion notice.  Destroys the
    /// channel when its last member leaves.
    ///
    /// The client's own membership list is left untouched; callers keep it
    /// in sync.
    fn remove_from_channel(&mut self, channel_name: &str, id: ConnId, nick: &str) {
        let departure = match self.channels.get_mut(channel_name) {
            Some(channel) => channel.remove_member(id),
            None => return,
        };
        match departure {
            Departure::Empty => {
                log::debug!("Channel {} is empty, removing", channel_name);
                self.channels.remove(channel_name);
            }
            Departure::Remaining { promoted } => {
                let mut response = Buffer::new();
                {
                    let mut msg = response.message(&self.domain, Command::Notice)
                        .param(channel_name);
                    let trailing = msg.raw_trailing_param();
                    trailing.push_str(nick);
                    trailing.push_str(lines::LEFT_CHANNEL);
                }
                if let Some(promoted) = promoted {
                    log::debug!("{}: Now operator of {}", promoted, channel_name);
                    let mut msg = response.message(&self.domain, Command::Notice)
                        .param(channel_name);
                    let trailing = msg.raw_trailing_param();
                    trailing.push_str(self.clients[&promoted].nick());
                    trailing.push_str(lines::NEW_OPERATOR);
                }
                self.broadcast(channel_name, MessageQueueItem::from(response), None);
            }
        }
    }

    pub fn handle_message(&mut self, id: ConnId, msg: Message<'_>) -> bool {
        let client = match self.clients.get(&id) {
            Some(client) => client,
            None => return false,
        };

        // A prefix, when given, must name the sender; anything else is
        // dropped without a reply.
        if let Some(prefix) = msg.prefix {
            if prefix != client.nick() {
                log::debug!("{}: Dropped, prefix {:?} is not theirs", id, prefix);
                return true;
            }
        }

        let mut rb = ReplyBuffer::new(&self.domain, client.nick());

        let command = match msg.command {
            Ok(cmd) => cmd,
            Err(unknown) => {
                if client.is_registered() {
                    rb.reply(rpl::ERR_UNKNOWNCOMMAND)
                        .param(unknown)
                        .trailing_param(lines::UNKNOWN_COMMAND);
                    client.send(rb);
                }
                return true;
            }
        };

        // Commands outside the registration handshake are dropped, without
        // a reply, until the client registers.
        if !client.is_registered() && needs_registration(command) {
            log::debug!("{}: Dropped {}, not registered", id, command);
            return true;
        }

        if !msg.has_enough_params() {
            match command {
                Command::Nick => {
                    rb.reply(rpl::ERR_NONICKNAMEGIVEN)
                        .trailing_param(lines::NO_NICKNAME_GIVEN);
                }
                Command::PrivMsg | Command::Notice if msg.num_params == 0 => {
                    lines::no_recipient(rb.reply(rpl::ERR_NORECIPIENT), command.as_str());
                }
                Command::PrivMsg | Command::Notice => {
                    rb.reply(rpl::ERR_NOTEXTTOSEND).trailing_param(lines::NO_TEXT_TO_SEND);
                }
                _ => {
                    rb.reply(rpl::ERR_NEEDMOREPARAMS)
                        .param(command.as_str())
                        .trailing_param(lines::NEED_MORE_PARAMS);
                }
            }
            client.send(rb);
            return true;
        }

        let ps = msg.params;
        let n = msg.num_params;
        log::debug!("{}: {} {:?}", id, command, &ps[..n]);
        let ctx = CommandContext { id, rb: &mut rb };
        let result = match command {
            Command::Join => self.cmd_join(ctx, ps[0]),
            Command::Kick => self.cmd_kick(ctx, ps[0], ps[1], ps[2]),
            Command::Nick => self.cmd_nick(ctx, ps[0]),
            Command::Notice => self.cmd_notice(ctx, ps[0], ps[1]),
            Command::Part => self.cmd_part(ctx, ps[0], ps[1]),
            Command::Pass => self.cmd_pass(ctx, ps[0]),
            Command::Ping => self.cmd_ping(ctx, ps[0]),
            Command::PrivMsg => self.cmd_privmsg(ctx, ps[0], ps[1]),
            Command::Quit => self.cmd_quit(ctx, ps[0]),
            Command::User => self.cmd_user(ctx, ps[0]),
            Command::Reply(_) => Ok(()),
        };

        if !rb.is_empty() {
            self.send(id, MessageQueueItem::from(rb));
        }
        result.is_ok()
    }

    /// Looks a client up by nickname, ignoring ASCII case.
    fn find_nick(&self, nick: &str) -> Option<ConnId> {
        self.nicks.get(&nick.to_ascii_lowercase()).copied()
    }
}

// Send utilities
impl StateInner {
    /// Sends the given message to the given client.
    fn send(&self, id: ConnId, msg: MessageQueueItem) {
        if let Some(client) = self.clients.get(&id) {
            client.send(msg);
        }
    }

    /// Sends the given message to all members of the given channel, except
    /// `ignored` if set.
    fn broadcast(&self, channel_name: &str, msg: MessageQueueItem, ignored: Option<ConnId>) {
        let channel = &self.channels[channel_name];
        for member in channel.members() {
            if Some(member) == ignored {
                continue;
            }
            self.send(member, msg.clone());
        }
    }

    /// Sends the given message once to every client that shares a channel
    /// with the given client, except `ignored` if set.
    fn broadcast_to_joined(&self, id: ConnId, msg: MessageQueueItem, ignored: Option<ConnId>) {
        let mut noticed = HashSet::new();
        for name in &self.clients[&id].channels {
            if let Some(channel) = self.channels.get(name) {
                noticed.extend(channel.members());
            }
        }
        if let Some(ignored) = ignored {
            noticed.remove(&ignored);
        }
        for member in noticed {
            self.send(member, msg.clone());
        }
    }

    /// Sends the list of members of the channel `channel_name` to the given
    /// client.  Operators are marked with `@`.
    fn write_names(&self, rb: &mut ReplyBuffer, channel_name: &str) {
        let channel = &self.channels[channel_name];
        if !channel.is_empty() {
            let mut msg = rb.reply(rpl::NAMREPLY).param("=").param(channel_name);
            let trailing = msg.raw_trailing_param();
            for member in channel.members() {
                if channel.is_operator(member) {
                    trailing.push('@');
                }
                trailing.push_str(self.clients[&member].nick());
                trailing.push(' ');
            }
            trailing.pop();  // Remove last space
        }
        rb.reply(rpl::ENDOFNAMES)
            .param(channel_name)
            .trailing_param(lines::END_OF_NAMES);
    }
}

/// Whether the command is unavailable until the client registers.
///
/// Commands outside this set are silently dropped for unregistered clients.
fn needs_registration(command: Command) -> bool {
    !matches!(command, Command::Pass | Command::Nick | Command::User
                     | Command::Ping | Command::Quit)
}

/// Cuts the string at the given byte length, on a character boundary.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn is_valid_channel_name(s: &str) -> bool {
    // https://tools.ietf.org/html/rfc2811.html#section-2.1
    let ctrl_g = 7 as char;
    let bytes = s.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= MAX_CHANNEL_NAME_LENGTH
        && bytes[0] == b'#'
        && s.chars().all(|c| c != ' ' && c != ',' && c != ctrl_g && c != ':')
}

fn is_valid_nickname(s: &str) -> bool {
    let s = s.as_bytes();
    let is_valid_nickname_char = |&c: &u8| {
        (b'0' <= c && c <= b'9')
            || (b'a' <= c && c <= b'z')
            || (b'A' <= c && c <= b'Z')
            // "[", "]", "\", "`", "_", "^", "{", "|", "}"
            || (0x5b <= c && c <= 0x60)
            || (0x7b <= c && c <= 0x7d)
    };
    !s.is_empty()
        && s.len() <= MAX_NICKNAME_LENGTH
        && s.iter().all(is_valid_nickname_char)
        && !(b'0' <= s[0] && s[0] <= b'9')
}
