//! Human-readable parts of the server's replies.

use crate::message::MessageBuffer;

pub const ALREADY_REGISTERED: &str = "Unauthorized command (already registered)";

pub const CHAN_O_PRIVS_NEEDED: &str = "You're not channel operator";

pub const END_OF_NAMES: &str = "End of /NAMES list";

pub const ERRONEOUS_CHANNEL_NAME: &str = "Erroneous channel name";

pub const ERRONEOUS_NICKNAME: &str = "Erroneous nickname";

pub const NEED_MORE_PARAMS: &str = "Not enough parameters";

pub const NICKNAME_IN_USE: &str = "Nickname is already in use";

pub const NO_NICKNAME_GIVEN: &str = "No nickname given";

pub const NO_ORIGIN: &str = "No origin specified";

pub const NO_SUCH_CHANNEL: &str = "No such channel";

pub const NO_SUCH_NICK: &str = "No such nick/channel";

pub const NO_TEXT_TO_SEND: &str = "No text to send";

pub const NOT_ON_CHANNEL: &str = "You're not on that channel";

pub const PASSWORD_MISMATCH: &str = "Password incorrect";

pub const UNAVAIL_RESOURCE: &str = "Nick/channel is temporarily unavailable";

pub const UNKNOWN_COMMAND: &str = "Unknown command";

pub const USER_NOT_IN_CHANNEL: &str = "They aren't on that channel";

/// The default QUIT reason.
pub const QUIT_DEFAULT: &str = "leaving";

// Channel departure notices.  The wording dates back to the first version
// of the server and is kept verbatim.

pub const LEFT_CHANNEL: &str = " leaved channel.";

pub const NEW_OPERATOR: &str = " is new channel operator.";

// Lines with parameters

pub fn welcome(mut r: MessageBuffer<'_>, domain: &str, nick: &str) {
    let trailing = r.raw_trailing_param();
    trailing.push_str("Welcome to the ");
    trailing.push_str(domain);
    trailing.push_str(" Network, ");
    trailing.push_str(nick);
}

pub fn no_recipient(mut r: MessageBuffer<'_>, command: &str) {
    let trailing = r.raw_trailing_param();
    trailing.push_str("No recipient given (");
    trailing.push_str(command);
    trailing.push(')');
}

pub fn closing_link(mut r: MessageBuffer<'_>, host: &str, reason: &str) {
    let trailing = r.raw_trailing_param();
    trailing.push_str("Closing Link: ");
    trailing.push_str(host);
    trailing.push_str(" (");
    trailing.push_str(reason);
    trailing.push(')');
}
