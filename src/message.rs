//! IRC message parsing and building.

pub use rpl::Reply;
use std::fmt;

/// The maximum length of a message, terminator included.
///
/// `Message::parse` accepts longer inputs; the limit is enforced by the
/// framing layer and used here to size allocations.
pub const MESSAGE_LENGTH: usize = 512;

/// The number of elements in `Message::params`.
pub const PARAMS_LENGTH: usize = 15;

/// The subset of IRC replies tern emits.
///
/// All replies have the client's nick as first parameter.
///
/// Source: <https://tools.ietf.org/html/rfc2812.html#section-5>
pub mod rpl {
    pub type Reply = &'static str;

    pub const WELCOME: Reply    = "001";  // :Welcome message
    pub const NAMREPLY: Reply   = "353";  // = <channel> :<nicks>
    pub const ENDOFNAMES: Reply = "366";  // <channel> :End of names list

    pub const ERR_NOSUCHNICK: Reply          = "401";  // <nick> :No such nick/channel
    pub const ERR_NOSUCHCHANNEL: Reply       = "403";  // <channel> :No such channel
    pub const ERR_NOORIGIN: Reply            = "409";  // :No origin specified
    pub const ERR_NORECIPIENT: Reply         = "411";  // :No recipient given
    pub const ERR_NOTEXTTOSEND: Reply        = "412";  // :No text to send
    pub const ERR_UNKNOWNCOMMAND: Reply      = "421";  // <command> :Unknown command
    pub const ERR_NONICKNAMEGIVEN: Reply     = "431";  // :No nickname given
    pub const ERR_ERRONEUSNICKNAME: Reply    = "432";  // <nick> :Erroneous nickname
    pub const ERR_NICKNAMEINUSE: Reply       = "433";  // <nick> :Nickname in use
    pub const ERR_UNAVAILRESOURCE: Reply     = "437";  // <target> :Temporarily unavailable
    pub const ERR_USERNOTINCHANNEL: Reply    = "441";  // <nick> <channel> :User not in channel
    pub const ERR_NOTONCHANNEL: Reply        = "442";  // <channel> :You're not on that channel
    pub const ERR_NEEDMOREPARAMS: Reply      = "461";  // <command> :Not enough parameters
    pub const ERR_ALREADYREGISTRED: Reply    = "462";  // :Already registered
    pub const ERR_PASSWDMISMATCH: Reply      = "464";  // :Password incorrect
    pub const ERR_ERRONEUSCHANNELNAME: Reply = "479";  // <channel> :Erroneous channel name
    pub const ERR_CHANOPRIVSNEEDED: Reply    = "482";  // <channel> :You're not an operator
}

/// Returns `(word, rest)` where `word` is the first word of the given string
/// and `rest` starts at the first character of the second word.
///
/// Word boundaries here are spaces only.
fn parse_word(s: &str) -> (&str, &str) {
    let mut split = s.splitn(2, ' ')
        .map(str::trim)
        .filter(|s| !s.is_empty());
    (split.next().unwrap_or(""), split.next().unwrap_or(""))
}

/// If the given string starts with a prefix, returns `(Some(prefix), rest)`
/// where `rest` starts from the first word after the prefix.
///
/// Otherwise returns `(None, rest)` where `rest` is the substring starting
/// from the first word of the given string.
fn parse_prefix(buf: &str) -> (Option<&str>, &str) {
    if buf.starts_with(':') {
        let (prefix, rest) = parse_word(buf);
        (Some(&prefix[1..]), rest)
    } else {
        (None, buf.trim_start())
    }
}

/// Parses the first word of the string the same way as `parse_word`, then
/// tries to parse it as a command.
///
/// On success it returns `(Ok(command), rest)`; when the keyword is not a
/// variant of `Command`, it returns `(Err(keyword), rest)`.
fn parse_command(buf: &str) -> (Result<Command, &str>, &str) {
    let (command_string, rest) = parse_word(buf);
    (Command::parse(command_string).ok_or(command_string), rest)
}

macro_rules! commands {
    ( $( $cmd:ident $cmd_str:literal $n:literal )* ) => {
        /// The commands tern dispatches on, generated by `commands!`.
        ///
        /// Unknown keywords are kept by `Message` as raw strings; this enum
        /// only contains the supported verbs.
        #[derive(Clone, Copy, Debug, PartialEq)]
        pub enum Command {
            $( $cmd, )*
            Reply(Reply),
        }

        impl Command {
            /// From a given command string, returns the corresponding
            /// command, or `None` otherwise.  Ignores ASCII case.
            pub fn parse(s: &str) -> Option<Self> {
                $( if s.eq_ignore_ascii_case($cmd_str) {
                    Some(Command::$cmd)
                } else )* {
                    None
                }
            }

            /// Returns the number of required arguments for the command.
            ///
            /// The command may accept more arguments.
            pub fn required_params(&self) -> usize {
                match self {
                $(
                    Command::$cmd => $n,
                )*
                    Command::Reply(_) => 0,
                }
            }

            /// Returns the normalized command string.  It is not necessarily
            /// the string that has been parsed.
            pub fn as_str(&self) -> &'static str {
                match self {
                $(
                    Command::$cmd => $cmd_str,
                )*
                    Command::Reply(s) => s,
                }
            }
        }

        impl From<&'static str> for Command {
            /// `&'static str`s are converted to the `Command::Reply` variant.
            ///
            /// This lets `Buffer` accept both `Command` and `Reply` when
            /// building messages.
            fn from(reply: &'static str) -> Self {
                Command::Reply(reply)
            }
        }

        impl fmt::Display for Command {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.as_str().fmt(f)
            }
        }
    }
}

commands! {
//  Ident.   String     Minimum # of params
    Join     "JOIN"     1
    Kick     "KICK"     2
    Nick     "NICK"     1
    Notice   "NOTICE"   2
    Part     "PART"     1
    Pass     "PASS"     1
    Ping     "PING"     1
    PrivMsg  "PRIVMSG"  2
    Quit     "QUIT"     0
    User     "USER"     4
}

/// An IRC message.
///
/// See `Message::parse` for how incoming lines are read, and `Buffer` for
/// how outgoing messages are built.
///
/// See the RFC 2812 for a complete description of IRC messages:
/// <https://tools.ietf.org/html/rfc2812.html#section-2.3>.
#[derive(Clone, Debug)]
pub struct Message<'a> {
    /// The prefix of the message, without the leading `:`.
    pub prefix: Option<&'a str>,

    /// The command of the message.
    ///
    /// Either a known verb in the form `Ok(Command::_)`, or the raw keyword.
    pub command: Result<Command, &'a str>,

    /// The number of valid elements in `Message::params`.
    pub num_params: usize,

    /// The parameters of the message.
    ///
    /// Only the first `num_params` elements are meaningful.
    pub params: [&'a str; PARAMS_LENGTH],
}

impl<'a> Message<'a> {
    /// Parses a line (with or without its terminator) into a `Message`.
    ///
    /// Parameters are split on runs of spaces; the first parameter starting
    /// with `:` consumes the rest of the line, spaces included.  Returns
    /// `None` for empty lines and lines without a command.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use tern::message::{Command, Message};
    /// let privmsg = Message::parse(":amos PRIVMSG #city :the count is 3\r\n").unwrap();
    ///
    /// assert_eq!(privmsg.prefix, Some("amos"));
    /// assert_eq!(privmsg.command, Ok(Command::PrivMsg));
    /// assert_eq!(privmsg.num_params, 2);
    /// assert_eq!(privmsg.params[0], "#city");
    /// assert_eq!(privmsg.params[1], "the count is 3");
    /// ```
    ///
    /// Unknown keywords are kept verbatim:
    ///
    /// ```rust
    /// # use tern::message::Message;
    /// let unknown = Message::parse("TOPIC #city\r\n").unwrap();
    ///
    /// assert_eq!(unknown.command, Err("TOPIC"));
    /// ```
    pub fn parse(s: &'a str) -> Option<Message<'a>> {
        let mut buf = s.trim();
        if buf.is_empty() || buf.contains('\0') {
            return None;
        }

        let (prefix, rest) = parse_prefix(buf);
        buf = rest;
        let (command, rest) = parse_command(buf);
        buf = rest;

        if let Err("") = command {
            return None;
        }

        let mut params = [""; PARAMS_LENGTH];
        let mut num_params = 0;
        while num_params < PARAMS_LENGTH {
            if buf.is_empty() {
                break;
            }
            if buf.starts_with(':') {
                params[num_params] = &buf[1..];
                buf = "";
            } else {
                let (word, rest) = parse_word(buf);
                params[num_params] = word;
                buf = rest;
            }
            num_params += 1;
        }

        Some(Message { prefix, command, num_params, params })
    }

    /// Returns true if the message has enough parameters for its command.
    pub fn has_enough_params(&self) -> bool {
        match self.command {
            Ok(cmd) => cmd.required_params() <= self.num_params,
            Err(_) => false,
        }
    }
}

/// Helper to build one IRC message.
///
/// Returned by `Buffer::message` and `ReplyBuffer::reply`; appends `\r\n`
/// when dropped.
pub struct MessageBuffer<'a> {
    buf: &'a mut String,
}

impl<'a> MessageBuffer<'a> {
    fn with_prefix<C>(buf: &'a mut String, prefix: &str, command: C) -> Self
        where C: Into<Command>
    {
        if !prefix.is_empty() {
            buf.push(':');
            buf.push_str(prefix);
            buf.push(' ');
        }
        buf.push_str(command.into().as_str());
        MessageBuffer { buf }
    }

    /// Appends a parameter to the message.
    ///
    /// The parameter is trimmed before insertion; whitespace-only parameters
    /// are skipped.
    pub fn param(self, param: &str) -> Self {
        let param = param.trim();
        if param.is_empty() {
            return self;
        }
        self.buf.push(' ');
        self.buf.push_str(param);
        self
    }

    /// Appends the trailing parameter to the message and consumes the
    /// buffer.
    ///
    /// Contrary to `MessageBuffer::param`, the parameter is not trimmed
    /// before insertion, and it is prefixed with `:` so it may be empty or
    /// contain spaces.
    pub fn trailing_param(self, param: &str) {
        self.buf.push(' ');
        self.buf.push(':');
        self.buf.push_str(param);
    }

    /// Appends the final parameter of the message, choosing its wire form.
    ///
    /// The parameter gets a `:` prefix exactly when it needs one: when it is
    /// empty, contains a space, or itself starts with `:`.
    pub fn last_param(self, param: &str) {
        if param.is_empty() || param.contains(' ') || param.starts_with(':') {
            self.trailing_param(param);
        } else {
            self.buf.push(' ');
            self.buf.push_str(param);
        }
    }

    /// Returns the underlying buffer, to append characters to the trailing
    /// parameter of the message.
    pub fn raw_trailing_param(&mut self) -> &mut String {
        self.buf.push(' ');
        self.buf.push(':');
        self.buf
    }
}

impl Drop for MessageBuffer<'_> {
    /// Auto-magically append "\r\n" when the `MessageBuffer` is dropped.
    fn drop(&mut self) {
        self.buf.push('\r');
        self.buf.push('\n');
    }
}

/// Helper to build IRC messages.
///
/// Eases the creation of strings representing valid IRC messages.  If you
/// mainly need to send replies, `ReplyBuffer` might be a better fit.
///
/// # Example
///
/// ```rust
/// # use tern::message::{Command, Buffer};
/// let mut response = Buffer::new();
///
/// response.message("nick!user@127.0.0.1", Command::Part)
///     .param("#hall")
///     .trailing_param("bye!");
///
/// assert_eq!(&response.build(), ":nick!user@127.0.0.1 PART #hall :bye!\r\n");
/// ```
///
/// # On allocation
///
/// Allocation only occurs on `Buffer::message` calls, which reserve
/// `MESSAGE_LENGTH` prior to writing on the internal buffer.
#[derive(Debug)]
pub struct Buffer {
    buf: String,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    /// Creates a `Buffer`.  Does not allocate.
    pub fn new() -> Self {
        Self { buf: String::new() }
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends an IRC message with a prefix to the buffer.
    ///
    /// This function may allocate to reserve space for the message.
    pub fn message<C>(&mut self, prefix: &str, command: C) -> MessageBuffer<'_>
        where C: Into<Command>
    {
        self.buf.reserve(MESSAGE_LENGTH);
        MessageBuffer::with_prefix(&mut self.buf, prefix, command)
    }

    /// Consumes the `Buffer` and returns the underlying `String`.
    pub fn build(self) -> String {
        self.buf
    }
}

/// Helper to build IRC replies.
///
/// IRC replies are IRC messages that have the domain of the server as prefix
/// and the nickname of the client as first parameter.
///
/// # Example
///
/// ```rust
/// # use tern::message::{ReplyBuffer, rpl};
/// let mut response = ReplyBuffer::new("tern.localdomain", "nickname");
///
/// response.reply(rpl::ERR_NICKNAMEINUSE)
///     .param("taken")
///     .trailing_param("Nickname is already in use");
///
/// assert_eq!(&response.build(), ":tern.localdomain 433 nickname taken \
/// :Nickname is already in use\r\n");
/// ```
pub struct ReplyBuffer {
    domain: String,
    nick: String,
    buf: Buffer,
}

impl ReplyBuffer {
    /// Creates a new `ReplyBuffer` for the client whose nickname is `nick`.
    pub fn new(domain: &str, nick: &str) -> Self {
        Self {
            domain: domain.to_owned(),
            nick: nick.to_owned(),
            buf: Buffer::new(),
        }
    }

    /// Whether the buffer has messages in it or not.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Updates the nickname used as the first parameter of replies.
    pub fn set_nick(&mut self, nick: &str) {
        self.nick.clear();
        self.nick.push_str(nick);
    }

    /// Appends a reply to the buffer.
    ///
    /// This pushes the domain, the reply and the nickname of the client, and
    /// returns the resulting `MessageBuffer`.
    pub fn reply<C>(&mut self, r: C) -> MessageBuffer<'_>
        where C: Into<Command>
    {
        let Self { domain, nick, buf } = self;
        buf.message(domain, r).param(nick)
    }

    /// Appends a prefixed message like you would do with a `Buffer`.
    pub fn message<C>(&mut self, prefix: &str, command: C) -> MessageBuffer<'_>
        where C: Into<Command>
    {
        self.buf.message(prefix, command)
    }

    /// Consumes the buffer and returns the underlying `String`.
    pub fn build(self) -> String {
        self.buf.build()
    }
}
