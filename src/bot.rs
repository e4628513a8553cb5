//! The channel bot hook.
//!
//! Channel messages that start with `!` are offered to the installed bot.
//! The bot itself lives outside the server; this module only defines the
//! seam between the two.

/// A bot that reacts to `!`-triggers in channel messages.
///
/// Installed with [`crate::State::set_bot`].  When a PRIVMSG to a channel
/// starts with `!`, the server calls `respond` with the channel name and the
/// full message text; a `Some` answer is broadcast to the channel as a
/// server notice.
pub trait Bot: Send {
    fn respond(&mut self, channel: &str, trigger: &str) -> Option<String>;
}
