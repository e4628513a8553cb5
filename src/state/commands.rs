//! Handlers for the supported commands.
//!
//! <https://tools.ietf.org/html/rfc2812.html>

use crate::channel::Channel;
use crate::client::MessageQueueItem;
use crate::lines;
use crate::message::{Buffer, Command, rpl};
use super::{CommandContext, HandlerResult, MAX_CHANNELS, MAX_CHANNEL_NAME_LENGTH,
            MAX_NICKNAME_LENGTH, is_valid_channel_name, is_valid_nickname, truncate};

// Command handlers
impl super::StateInner {
    // JOIN

    pub fn cmd_join(&mut self, ctx: CommandContext<'_>, targets: &str) -> HandlerResult {
        // "JOIN 0" leaves every channel instead of joining one.
        if targets == "0" {
            return self.cmd_join_zero(ctx);
        }

        for target in targets.split(',') {
            if !target.starts_with('#') {
                log::debug!("{}:     Can't join {:?}: not a channel name", ctx.id, target);
                ctx.rb.reply(rpl::ERR_NOSUCHCHANNEL)
                    .param(target)
                    .trailing_param(lines::NO_SUCH_CHANNEL);
                continue;
            }
            let target = truncate(target, MAX_CHANNEL_NAME_LENGTH);
            if !is_valid_channel_name(target) {
                log::debug!("{}:     Can't join {:?}: invalid channel name", ctx.id, target);
                ctx.rb.reply(rpl::ERR_ERRONEUSCHANNELNAME)
                    .param(target)
                    .trailing_param(lines::ERRONEOUS_CHANNEL_NAME);
                continue;
            }

            if let Some(channel) = self.channels.get(target) {
                if channel.has_member(ctx.id) {
                    continue;
                }
            } else {
                if MAX_CHANNELS <= self.channels.len() {
                    log::debug!("{}:     Can't join {:?}: too many channels", ctx.id, target);
                    ctx.rb.reply(rpl::ERR_UNAVAILRESOURCE)
                        .param(target)
                        .trailing_param(lines::UNAVAIL_RESOURCE);
                    return Ok(());
                }
                self.channels.insert(target.to_owned(), Channel::new());
            }

            self.channels.get_mut(target).unwrap().add_member(ctx.id);
            let client = self.clients.get_mut(&ctx.id).unwrap();
            client.channels.insert(target.to_owned());

            let mut join_response = Buffer::new();
            join_response.message(client.source(), Command::Join).trailing_param(target);
            self.broadcast(target, MessageQueueItem::from(join_response), None);
            self.write_names(ctx.rb, target);
        }
        Ok(())
    }

    /// The `JOIN 0` form: part every joined channel.
    fn cmd_join_zero(&mut self, ctx: CommandContext<'_>) -> HandlerResult {
        let client = &self.clients[&ctx.id];
        let names: Vec<String> = client.channels.iter().cloned().collect();
        let nick = client.nick().to_owned();
        let source = client.source().to_owned();

        for name in &names {
            self.remove_from_channel(name, ctx.id, &nick);

            let mut response = Buffer::new();
            response.message(&source, Command::Part).param(name);
            let msg = MessageQueueItem::from(response);
            self.send(ctx.id, msg.clone());
            if self.channels.contains_key(name.as_str()) {
                self.broadcast(name, msg, None);
            }
        }
        self.clients.get_mut(&ctx.id).unwrap().channels.clear();
        Ok(())
    }

    // KICK

    pub fn cmd_kick(&mut self, ctx: CommandContext<'_>, target: &str,
                    nicks: &str, reason: &str) -> HandlerResult
    {
        match self.channels.get(target) {
            Some(channel) => {
                if !channel.has_member(ctx.id) {
                    log::debug!("{}:     Can't kick from {:?}: not on channel", ctx.id, target);
                    ctx.rb.reply(rpl::ERR_NOTONCHANNEL)
                        .param(target)
                        .trailing_param(lines::NOT_ON_CHANNEL);
                    return Ok(());
                }
                if !channel.is_operator(ctx.id) {
                    log::debug!("{}:     Can't kick from {:?}: not operator", ctx.id, target);
                    ctx.rb.reply(rpl::ERR_CHANOPRIVSNEEDED)
                        .param(target)
                        .trailing_param(lines::CHAN_O_PRIVS_NEEDED);
                    return Ok(());
                }
            }
            None => {
                log::debug!("{}:     Can't kick from {:?}: no such channel", ctx.id, target);
                ctx.rb.reply(rpl::ERR_NOSUCHCHANNEL)
                    .param(target)
                    .trailing_param(lines::NO_SUCH_CHANNEL);
                return Ok(());
            }
        }

        let source = self.clients[&ctx.id].source().to_owned();
        for nick in nicks.split(',') {
            let kicked = self.find_nick(nick).filter(|kicked| {
                self.channels.get(target).map_or(false, |c| c.has_member(*kicked))
            });
            let kicked = match kicked {
                Some(kicked) => kicked,
                None => {
                    log::debug!("{}:     Can't kick {:?}: not in channel", ctx.id, nick);
                    ctx.rb.reply(rpl::ERR_USERNOTINCHANNEL)
                        .param(nick)
                        .param(target)
                        .trailing_param(lines::USER_NOT_IN_CHANNEL);
                    continue;
                }
            };

            let mut kick_response = Buffer::new();
            {
                let msg = kick_response.message(&source, Command::Kick)
                    .param(target)
                    .param(nick);
                if !reason.is_empty() {
                    msg.trailing_param(reason);
                }
            }
            self.broadcast(target, MessageQueueItem::from(kick_response), None);

            let kicked_nick = self.clients[&kicked].nick().to_owned();
            self.remove_from_channel(target, kicked, &kicked_nick);
            self.clients.get_mut(&kicked).unwrap().channels.remove(target);
        }
        Ok(())
    }

    // NICK

    pub fn cmd_nick(&mut self, ctx: CommandContext<'_>, nick: &str) -> HandlerResult {
        if nick.is_empty() {
            ctx.rb.reply(rpl::ERR_NONICKNAMEGIVEN).trailing_param(lines::NO_NICKNAME_GIVEN);
            return Ok(());
        }
        let nick = truncate(nick, MAX_NICKNAME_LENGTH);
        if !is_valid_nickname(nick) {
            log::debug!("{}:     Can't set nick {:?}: bad nickname", ctx.id, nick);
            ctx.rb.reply(rpl::ERR_ERRONEUSNICKNAME)
                .param(nick)
                .trailing_param(lines::ERRONEOUS_NICKNAME);
            return Ok(());
        }
        if self.nicks.contains_key(&nick.to_ascii_lowercase()) {
            log::debug!("{}:     Can't set nick {:?}: already in use", ctx.id, nick);
            ctx.rb.reply(rpl::ERR_NICKNAMEINUSE)
                .param(nick)
                .trailing_param(lines::NICKNAME_IN_USE);
            return Ok(());
        }

        let old_nick = self.clients[&ctx.id].nick().to_owned();
        if old_nick != "*" {
            self.nicks.remove(&old_nick.to_ascii_lowercase());
        }
        self.nicks.insert(nick.to_ascii_lowercase(), ctx.id);
        self.clients.get_mut(&ctx.id).unwrap().set_nick(nick);
        ctx.rb.set_nick(nick);

        let client = &self.clients[&ctx.id];
        if !client.is_registered() {
            if client.can_register() {
                return self.complete_registration(ctx);
            }
            return Ok(());
        }

        let mut nick_response = Buffer::new();
        nick_response.message(&old_nick, Command::Nick).param(nick);
        let msg = MessageQueueItem::from(nick_response);
        if client.channels.is_empty() {
            client.send(msg);
        } else {
            self.broadcast_to_joined(ctx.id, msg, None);
        }
        Ok(())
    }

    // NOTICE

    pub fn cmd_notice(&mut self, ctx: CommandContext<'_>, targets: &str,
                      content: &str) -> HandlerResult
    {
        self.cmd_privnotice(ctx, Command::Notice, targets, content)
    }

    fn cmd_privnotice(&mut self, ctx: CommandContext<'_>, cmd: Command,
                      targets: &str, content: &str) -> HandlerResult
    {
        if content.is_empty() {
            ctx.rb.reply(rpl::ERR_NOTEXTTOSEND).trailing_param(lines::NO_TEXT_TO_SEND);
            return Ok(());
        }
        // NOTICE never yields per-target errors, per the RFC.
        let silent = cmd == Command::Notice;
        let source = self.clients[&ctx.id].source().to_owned();

        for target in targets.split(',') {
            if target.starts_with('#') {
                if !self.channels.contains_key(target) {
                    if !silent {
                        log::debug!("{}:     Can't send to {:?}: no such channel", ctx.id, target);
                        ctx.rb.reply(rpl::ERR_NOSUCHNICK)
                            .param(target)
                            .trailing_param(lines::NO_SUCH_NICK);
                    }
                    continue;
                }
                let mut response = Buffer::new();
                response.message(&source, cmd).param(target).trailing_param(content);
                let ignored = if silent { None } else { Some(ctx.id) };
                self.broadcast(target, MessageQueueItem::from(response), ignored);
                if !silent && content.starts_with('!') {
                    self.run_bot(target, content);
                }
            } else {
                let peer = match self.find_nick(target) {
                    Some(peer) => peer,
                    None => {
                        if !silent {
                            log::debug!("{}:     Can't send to {:?}: no such nick", ctx.id, target);
                            ctx.rb.reply(rpl::ERR_NOSUCHNICK)
                                .param(target)
                                .trailing_param(lines::NO_SUCH_NICK);
                        }
                        continue;
                    }
                };
                let mut response = Buffer::new();
                response.message(&source, cmd)
                    .param(self.clients[&peer].nick())
                    .trailing_param(content);
                self.send(peer, MessageQueueItem::from(response));
            }
        }
        Ok(())
    }

    /// Offers a channel message to the bot collaborator, and broadcasts its
    /// answer, if any, as a server notice.
    fn run_bot(&mut self, channel_name: &str, trigger: &str) {
        let answer = match self.bot.as_mut() {
            Some(bot) => bot.respond(channel_name, trigger),
            None => None,
        };
        if let Some(answer) = answer {
            let mut response = Buffer::new();
            response.message(&self.domain, Command::Notice)
                .param(channel_name)
                .trailing_param(&answer);
            self.broadcast(channel_name, MessageQueueItem::from(response), None);
        }
    }

    // PART

    pub fn cmd_part(&mut self, ctx: CommandContext<'_>, targets: &str,
                    reason: &str) -> HandlerResult
    {
        for target in targets.split(',') {
            match self.channels.get(target) {
                Some(channel) if channel.has_member(ctx.id) => {}
                Some(_) => {
                    log::debug!("{}:     Can't part {:?}: not on channel", ctx.id, target);
                    ctx.rb.reply(rpl::ERR_NOTONCHANNEL)
                        .param(target)
                        .trailing_param(lines::NOT_ON_CHANNEL);
                    continue;
                }
                None => {
                    log::debug!("{}:     Can't part {:?}: no such channel", ctx.id, target);
                    ctx.rb.reply(rpl::ERR_NOSUCHCHANNEL)
                        .param(target)
                        .trailing_param(lines::NO_SUCH_CHANNEL);
                    continue;
                }
            }

            let client = &self.clients[&ctx.id];
            let nick = client.nick().to_owned();
            let source = client.source().to_owned();
            self.remove_from_channel(target, ctx.id, &nick);
            self.clients.get_mut(&ctx.id).unwrap().channels.remove(target);

            let mut response = Buffer::new();
            {
                let msg = response.message(&source, Command::Part).param(target);
                if !reason.is_empty() {
                    msg.trailing_param(reason);
                }
            }
            let msg = MessageQueueItem::from(response);
            self.send(ctx.id, msg.clone());
            if self.channels.contains_key(target) {
                self.broadcast(target, msg, None);
            }
        }
        Ok(())
    }

    // PASS

    pub fn cmd_pass(&mut self, ctx: CommandContext<'_>, password: &str) -> HandlerResult {
        let client = self.clients.get_mut(&ctx.id).unwrap();
        if client.is_registered() {
            ctx.rb.reply(rpl::ERR_ALREADYREGISTRED).trailing_param(lines::ALREADY_REGISTERED);
            return Ok(());
        }
        client.set_password(password);
        Ok(())
    }

    // PING

    pub fn cmd_ping(&mut self, ctx: CommandContext<'_>, payload: &str) -> HandlerResult {
        if payload.is_empty() {
            ctx.rb.reply(rpl::ERR_NOORIGIN).trailing_param(lines::NO_ORIGIN);
            return Ok(());
        }
        ctx.rb.message(&self.domain, "PONG").param(&self.domain).last_param(payload);
        Ok(())
    }

    // PRIVMSG

    pub fn cmd_privmsg(&mut self, ctx: CommandContext<'_>, targets: &str,
                       content: &str) -> HandlerResult
    {
        self.cmd_privnotice(ctx, Command::PrivMsg, targets, content)
    }

    // QUIT

    pub fn cmd_quit(&mut self, ctx: CommandContext<'_>, reason: &str) -> HandlerResult {
        let client = &self.clients[&ctx.id];

        let mut quit_reason = String::from("Quit: ");
        quit_reason.push_str(if reason.is_empty() { lines::QUIT_DEFAULT } else { reason });

        let mut response = Buffer::new();
        lines::closing_link(response.message("", "ERROR"), client.host(), &quit_reason);
        client.send(MessageQueueItem::from(response));

        self.remove_client(ctx.id, &quit_reason);
        Err(())
    }

    // USER

    pub fn cmd_user(&mut self, ctx: CommandContext<'_>, user: &str) -> HandlerResult {
        let client = self.clients.get_mut(&ctx.id).unwrap();
        if client.is_registered() {
            ctx.rb.reply(rpl::ERR_ALREADYREGISTRED).trailing_param(lines::ALREADY_REGISTERED);
            return Ok(());
        }
        if user.is_empty() {
            ctx.rb.reply(rpl::ERR_NEEDMOREPARAMS)
                .param(Command::User.as_str())
                .trailing_param(lines::NEED_MORE_PARAMS);
            return Ok(());
        }
        client.set_user(user);
        if self.clients[&ctx.id].can_register() {
            return self.complete_registration(ctx);
        }
        Ok(())
    }

    /// Checks the stored password once both NICK and USER went through.
    ///
    /// A match registers the client and welcomes it; a mismatch disconnects
    /// it on the spot.
    fn complete_registration(&mut self, ctx: CommandContext<'_>) -> HandlerResult {
        let client = self.clients.get_mut(&ctx.id).unwrap();
        if client.password() != self.password {
            log::debug!("{}:     Password mismatch", ctx.id);
            let mut response = Buffer::new();
            response.message(&self.domain, rpl::ERR_PASSWDMISMATCH)
                .param(client.nick())
                .trailing_param(lines::PASSWORD_MISMATCH);
            client.send(MessageQueueItem::from(response));
            self.remove_client(ctx.id, lines::QUIT_DEFAULT);
            return Err(());
        }

        client.set_registered();
        let nick = client.nick().to_owned();
        log::debug!("{}: Registered as {}", ctx.id, nick);
        ctx.rb.set_nick(&nick);
        lines::welcome(ctx.rb.reply(rpl::WELCOME), &self.domain, &nick);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::channel::Departure;
    use super::super::test;

    const WELCOME_ALICE: &str = ":tern.localdomain 001 alice \
        :Welcome to the tern.localdomain Network, alice\r\n";

    #[test]
    fn registration_succeeds_with_password() {
        let mut state = test::simple_state();
        let (id, mut queue) = test::add_client(&mut state);

        assert!(test::handle_line(&mut state, id, "PASS chirp"));
        assert!(test::handle_line(&mut state, id, "NICK alice"));
        assert!(test::handle_line(&mut state, id, "USER alice 0 * :Alice"));

        let mut buf = String::new();
        test::collect(&mut buf, &mut queue);
        assert_eq!(buf, WELCOME_ALICE);
        assert!(state.clients[&id].is_registered());
        assert_eq!(state.find_nick("alice"), Some(id));
    }

    #[test]
    fn registration_order_does_not_matter() {
        let mut state = test::simple_state();
        let (id, mut queue) = test::add_client(&mut state);

        test::handle_line(&mut state, id, "USER alice 0 * :Alice");
        test::handle_line(&mut state, id, "PASS chirp");
        test::handle_line(&mut state, id, "NICK alice");

        let mut buf = String::new();
        test::collect(&mut buf, &mut queue);
        assert_eq!(buf, WELCOME_ALICE);
    }

    #[test]
    fn registration_fails_on_wrong_password() {
        let mut state = test::simple_state();
        let (id, mut queue) = test::add_client(&mut state);

        test::handle_line(&mut state, id, "PASS wrong");
        test::handle_line(&mut state, id, "NICK alice");
        assert!(!test::handle_line(&mut state, id, "USER alice 0 * :Alice"));

        let mut buf = String::new();
        test::collect(&mut buf, &mut queue);
        assert_eq!(buf, ":tern.localdomain 464 alice :Password incorrect\r\n");

        // The connection is gone; buffered input is not processed.
        assert!(!state.clients.contains_key(&id));
        assert!(!test::handle_line(&mut state, id, "JOIN #x"));
    }

    #[test]
    fn missing_pass_counts_as_empty_password() {
        let mut state = test::simple_state();
        let (id, mut queue) = test::add_client(&mut state);

        test::handle_line(&mut state, id, "NICK alice");
        assert!(!test::handle_line(&mut state, id, "USER alice 0 * :Alice"));

        let mut buf = String::new();
        test::collect(&mut buf, &mut queue);
        assert_eq!(buf, ":tern.localdomain 464 alice :Password incorrect\r\n");
    }

    #[test]
    fn pass_and_user_reject_reregistration() {
        let mut state = test::simple_state();
        let (id, mut queue) = test::add_registered_client(&mut state, "alice");
        test::flush(&mut queue);

        test::handle_line(&mut state, id, "PASS chirp");
        test::handle_line(&mut state, id, "USER other 0 * :Other");

        let mut buf = String::new();
        test::collect(&mut buf, &mut queue);
        assert_eq!(buf, ":tern.localdomain 462 alice \
                         :Unauthorized command (already registered)\r\n\
                         :tern.localdomain 462 alice \
                         :Unauthorized command (already registered)\r\n");
    }

    #[test]
    fn unregistered_commands_are_dropped_silently() {
        let mut state = test::simple_state();
        let (id, mut queue) = test::add_client(&mut state);

        assert!(test::handle_line(&mut state, id, "JOIN #x"));
        assert!(test::handle_line(&mut state, id, "BLORP"));

        let mut buf = String::new();
        test::collect(&mut buf, &mut queue);
        assert_eq!(buf, "");
        assert!(state.channels.is_empty());
    }

    #[test]
    fn unknown_commands_get_a_reply_once_registered() {
        let mut state = test::simple_state();
        let (id, mut queue) = test::add_registered_client(&mut state, "alice");
        test::flush(&mut queue);

        test::handle_line(&mut state, id, "BLORP this that");

        let mut buf = String::new();
        test::collect(&mut buf, &mut queue);
        assert_eq!(buf, ":tern.localdomain 421 alice BLORP :Unknown command\r\n");
    }

    #[test]
    fn forged_prefixes_are_dropped() {
        let mut state = test::simple_state();
        let (id, mut queue) = test::add_registered_client(&mut state, "alice");
        test::flush(&mut queue);

        assert!(test::handle_line(&mut state, id, ":bob PING token"));
        let mut buf = String::new();
        test::collect(&mut buf, &mut queue);
        assert_eq!(buf, "");

        test::handle_line(&mut state, id, ":alice PING token");
        test::collect(&mut buf, &mut queue);
        assert_eq!(buf, ":tern.localdomain PONG tern.localdomain token\r\n");
    }

    #[test]
    fn ping_needs_an_origin() {
        let mut state = test::simple_state();
        let (id, mut queue) = test::add_registered_client(&mut state, "alice");
        test::flush(&mut queue);

        test::handle_line(&mut state, id, "PING");
        test::handle_line(&mut state, id, "PING :");

        let mut buf = String::new();
        test::collect(&mut buf, &mut queue);
        assert_eq!(buf, ":tern.localdomain 461 alice PING :Not enough parameters\r\n\
                         :tern.localdomain 409 alice :No origin specified\r\n");
    }

    #[test]
    fn nick_truncates_validates_and_dedupes() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        test::flush(&mut qa);
        let (b, mut qb) = test::add_client(&mut state);

        // Truncated to 9 characters before any other check.
        test::handle_line(&mut state, b, "NICK abcdefghijklm");
        assert_eq!(state.clients[&b].nick(), "abcdefghi");

        test::handle_line(&mut state, b, "NICK 1direction");
        test::handle_line(&mut state, b, "NICK ALICE");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qb);
        assert_eq!(buf, ":tern.localdomain 432 abcdefghi 1directio \
                         :Erroneous nickname\r\n\
                         :tern.localdomain 433 abcdefghi ALICE \
                         :Nickname is already in use\r\n");
        assert_eq!(state.clients[&b].nick(), "abcdefghi");
        assert_eq!(state.find_nick("alice"), Some(a));
    }

    #[test]
    fn nick_clash_keeps_placeholder() {
        let mut state = test::simple_state();
        let (_a, _qa) = test::add_registered_client(&mut state, "alice");
        let (b, mut qb) = test::add_client(&mut state);

        test::handle_line(&mut state, b, "NICK alice");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qb);
        assert_eq!(buf, ":tern.localdomain 433 * alice :Nickname is already in use\r\n");
        assert_eq!(state.clients[&b].nick(), "*");
    }

    #[test]
    fn nick_change_announces_to_shared_channels() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        let (b, mut qb) = test::add_registered_client(&mut state, "bob");
        test::sequence(&mut state, &[(a, "JOIN #x"), (b, "JOIN #x")]);
        test::flush(&mut qa);
        test::flush(&mut qb);

        test::handle_line(&mut state, a, "NICK alicia");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qb);
        assert_eq!(buf, ":alice NICK alicia\r\n");
        buf.clear();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, ":alice NICK alicia\r\n");

        // The old nickname is free again.
        assert_eq!(state.find_nick("alice"), None);
        assert_eq!(state.find_nick("alicia"), Some(a));
    }

    #[test]
    fn nick_change_echoes_without_channels() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        test::flush(&mut qa);

        test::handle_line(&mut state, a, "NICK alicia");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, ":alice NICK alicia\r\n");
    }

    #[test]
    fn join_creates_and_reports_names() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        test::flush(&mut qa);

        test::handle_line(&mut state, a, "JOIN #x");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, ":alice!alice@host JOIN :#x\r\n\
                         :tern.localdomain 353 alice = #x :@alice\r\n\
                         :tern.localdomain 366 alice #x :End of /NAMES list\r\n");
        assert!(state.channels["#x"].is_operator(a));
        assert!(state.clients[&a].channels.contains("#x"));
    }

    #[test]
    fn join_rejects_bad_names() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        test::flush(&mut qa);

        test::handle_line(&mut state, a, "JOIN beach,#bad:name");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, ":tern.localdomain 403 alice beach :No such channel\r\n\
                         :tern.localdomain 479 alice #bad:name :Erroneous channel name\r\n");
        assert!(state.channels.is_empty());
    }

    #[test]
    fn join_truncates_long_names() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        test::flush(&mut qa);

        let long = format!("#{}", "a".repeat(40));
        test::handle_line(&mut state, a, &format!("JOIN {}", long));

        assert_eq!(state.channels.len(), 1);
        assert!(state.channels.contains_key(&long[..31]));
    }

    #[test]
    fn join_twice_is_a_no_op() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        test::handle_line(&mut state, a, "JOIN #x");
        test::flush(&mut qa);

        test::handle_line(&mut state, a, "JOIN #x");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, "");
    }

    #[test]
    fn join_zero_leaves_everything() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        test::sequence(&mut state, &[(a, "JOIN #x"), (a, "JOIN #y")]);
        test::flush(&mut qa);

        test::handle_line(&mut state, a, "JOIN 0");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, ":alice!alice@host PART #x\r\n\
                         :alice!alice@host PART #y\r\n");
        assert!(state.channels.is_empty());
        assert!(state.clients[&a].channels.is_empty());
    }

    #[test]
    fn part_returns_to_prior_membership() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        test::flush(&mut qa);

        let before: Vec<String> = state.clients[&a].channels.iter().cloned().collect();
        test::handle_line(&mut state, a, "JOIN #x");
        test::handle_line(&mut state, a, "PART #x");

        let after: Vec<String> = state.clients[&a].channels.iter().cloned().collect();
        assert_eq!(before, after);
        assert!(!state.channels.contains_key("#x"));
    }

    #[test]
    fn part_rejects_strangers() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        let (b, mut qb) = test::add_registered_client(&mut state, "bob");
        test::handle_line(&mut state, a, "JOIN #x");
        test::flush(&mut qa);
        test::flush(&mut qb);

        test::handle_line(&mut state, b, "PART #x");
        test::handle_line(&mut state, b, "PART #nowhere");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qb);
        assert_eq!(buf, ":tern.localdomain 442 bob #x :You're not on that channel\r\n\
                         :tern.localdomain 403 bob #nowhere :No such channel\r\n");
    }

    #[test]
    fn part_carries_the_reason() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        let (b, mut qb) = test::add_registered_client(&mut state, "bob");
        test::sequence(&mut state, &[(a, "JOIN #x"), (b, "JOIN #x")]);
        test::flush(&mut qa);
        test::flush(&mut qb);

        test::handle_line(&mut state, b, "PART #x :got bored");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qb);
        assert_eq!(buf, ":bob!bob@host PART #x :got bored\r\n");
        buf.clear();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, ":tern.localdomain NOTICE #x :bob leaved channel.\r\n\
                         :bob!bob@host PART #x :got bored\r\n");
    }

    #[test]
    fn operator_succession_goes_to_lowest_id() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        let (b, mut qb) = test::add_registered_client(&mut state, "bob");
        test::sequence(&mut state, &[(a, "JOIN #x"), (b, "JOIN #x")]);
        test::flush(&mut qa);
        test::flush(&mut qb);

        test::handle_line(&mut state, a, "PART #x");

        assert!(state.channels["#x"].is_operator(b));
        let mut buf = String::new();
        test::collect(&mut buf, &mut qb);
        assert_eq!(buf, ":tern.localdomain NOTICE #x :alice leaved channel.\r\n\
                         :tern.localdomain NOTICE #x :bob is new channel operator.\r\n\
                         :alice!alice@host PART #x\r\n");
    }

    #[test]
    fn privmsg_fans_out_to_the_channel() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        let (b, mut qb) = test::add_registered_client(&mut state, "bob");
        test::sequence(&mut state, &[(a, "JOIN #x"), (b, "JOIN #x")]);
        test::flush(&mut qa);
        test::flush(&mut qb);

        test::handle_line(&mut state, a, "PRIVMSG #x :hi");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qb);
        assert_eq!(buf, ":alice!alice@host PRIVMSG #x :hi\r\n");
        buf.clear();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, "", "the sender must not receive its own message");
    }

    #[test]
    fn privmsg_reaches_users_directly() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        let (_b, mut qb) = test::add_registered_client(&mut state, "bob");
        test::flush(&mut qa);
        test::flush(&mut qb);

        test::handle_line(&mut state, a, "PRIVMSG bob,carol :psst");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qb);
        assert_eq!(buf, ":alice!alice@host PRIVMSG bob :psst\r\n");
        buf.clear();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, ":tern.localdomain 401 alice carol :No such nick/channel\r\n");
    }

    #[test]
    fn privmsg_requires_text_and_recipient() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        test::flush(&mut qa);

        test::handle_line(&mut state, a, "PRIVMSG");
        test::handle_line(&mut state, a, "PRIVMSG #x");
        test::handle_line(&mut state, a, "PRIVMSG #x :");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, ":tern.localdomain 411 alice :No recipient given (PRIVMSG)\r\n\
                         :tern.localdomain 412 alice :No text to send\r\n\
                         :tern.localdomain 412 alice :No text to send\r\n");
    }

    #[test]
    fn notice_is_silent_about_missing_targets() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        test::flush(&mut qa);

        test::handle_line(&mut state, a, "NOTICE #nowhere,carol :psst");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, "");
    }

    #[test]
    fn notice_includes_the_sender_in_the_fan_out() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        let (b, mut qb) = test::add_registered_client(&mut state, "bob");
        test::sequence(&mut state, &[(a, "JOIN #x"), (b, "JOIN #x")]);
        test::flush(&mut qa);
        test::flush(&mut qb);

        test::handle_line(&mut state, a, "NOTICE #x :heads up");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, ":alice!alice@host NOTICE #x :heads up\r\n");
        buf.clear();
        test::collect(&mut buf, &mut qb);
        assert_eq!(buf, ":alice!alice@host NOTICE #x :heads up\r\n");
    }

    #[test]
    fn kick_needs_operator_rights() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        let (b, mut qb) = test::add_registered_client(&mut state, "bob");
        test::sequence(&mut state, &[(a, "JOIN #x"), (b, "JOIN #x")]);
        test::flush(&mut qa);
        test::flush(&mut qb);

        test::handle_line(&mut state, b, "KICK #x alice :bye");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qb);
        assert_eq!(buf, ":tern.localdomain 482 bob #x :You're not channel operator\r\n");
        assert!(state.channels["#x"].has_member(a));
    }

    #[test]
    fn kick_removes_the_target() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        let (b, mut qb) = test::add_registered_client(&mut state, "bob");
        test::sequence(&mut state, &[(a, "JOIN #x"), (b, "JOIN #x")]);
        test::flush(&mut qa);
        test::flush(&mut qb);

        test::handle_line(&mut state, a, "KICK #x bob :behave");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qb);
        // The target sees the kick too.
        assert_eq!(buf, ":alice!alice@host KICK #x bob :behave\r\n");
        buf.clear();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, ":alice!alice@host KICK #x bob :behave\r\n\
                         :tern.localdomain NOTICE #x :bob leaved channel.\r\n");
        assert!(!state.channels["#x"].has_member(b));
        assert!(!state.clients[&b].channels.contains("#x"));
    }

    #[test]
    fn kick_reports_absent_targets() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        let (_b, _qb) = test::add_registered_client(&mut state, "bob");
        test::handle_line(&mut state, a, "JOIN #x");
        test::flush(&mut qa);

        test::handle_line(&mut state, a, "KICK #x bob");
        test::handle_line(&mut state, a, "KICK #nowhere bob");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, ":tern.localdomain 441 alice bob #x \
                         :They aren't on that channel\r\n\
                         :tern.localdomain 403 alice #nowhere :No such channel\r\n");
    }

    #[test]
    fn quit_says_goodbye() {
        let mut state = test::simple_state();
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        let (b, mut qb) = test::add_registered_client(&mut state, "bob");
        test::sequence(&mut state, &[(a, "JOIN #x"), (b, "JOIN #x")]);
        test::flush(&mut qa);
        test::flush(&mut qb);

        assert!(!test::handle_line(&mut state, a, "QUIT :my eyes hurt"));

        let mut buf = String::new();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, "ERROR :Closing Link: host (Quit: my eyes hurt)\r\n");
        buf.clear();
        test::collect(&mut buf, &mut qb);
        assert_eq!(buf, ":alice!alice@host QUIT :Quit: my eyes hurt\r\n\
                         :tern.localdomain NOTICE #x :alice leaved channel.\r\n\
                         :tern.localdomain NOTICE #x :bob is new channel operator.\r\n");
        assert!(!state.clients.contains_key(&a));
        assert_eq!(state.find_nick("alice"), None);
    }

    #[test]
    fn peer_disconnect_cleans_up_like_quit() {
        let mut state = test::simple_state();
        let (a, _qa) = test::add_registered_client(&mut state, "alice");
        let (b, mut qb) = test::add_registered_client(&mut state, "bob");
        test::sequence(&mut state, &[(a, "JOIN #x"), (b, "JOIN #x")]);
        test::flush(&mut qb);

        state.peer_quit(a, None);

        let mut buf = String::new();
        test::collect(&mut buf, &mut qb);
        assert_eq!(buf, ":alice!alice@host QUIT :Quit: leaving\r\n\
                         :tern.localdomain NOTICE #x :alice leaved channel.\r\n\
                         :tern.localdomain NOTICE #x :bob is new channel operator.\r\n");
        assert!(!state.clients.contains_key(&a));
    }

    #[test]
    fn quit_destroys_lonely_channels() {
        let mut state = test::simple_state();
        let (a, _qa) = test::add_registered_client(&mut state, "alice");
        test::handle_line(&mut state, a, "JOIN #x");

        test::handle_line(&mut state, a, "QUIT");

        assert!(state.channels.is_empty());
    }

    #[test]
    fn membership_stays_symmetric() {
        let mut state = test::simple_state();
        let (a, _qa) = test::add_registered_client(&mut state, "alice");
        let (b, _qb) = test::add_registered_client(&mut state, "bob");
        let (c, _qc) = test::add_registered_client(&mut state, "carol");
        test::sequence(&mut state, &[
            (a, "JOIN #x,#y"),
            (b, "JOIN #x"),
            (c, "JOIN #y"),
            (a, "KICK #x bob"),
            (c, "PART #y"),
            (b, "JOIN #y"),
            (a, "JOIN 0"),
        ]);

        for (id, client) in &state.clients {
            for name in &client.channels {
                assert!(state.channels[name].has_member(*id),
                        "{} believes to be in {}", id, name);
            }
        }
        for (name, channel) in &state.channels {
            assert!(!channel.is_empty(), "{} exists but is empty", name);
            for member in channel.members() {
                assert!(state.clients[&member].channels.contains(name),
                        "{} does not know about {}", member, name);
            }
        }
    }

    #[test]
    fn bot_answers_bang_messages() {
        struct CountBot(usize);
        impl crate::bot::Bot for CountBot {
            fn respond(&mut self, _channel: &str, trigger: &str) -> Option<String> {
                if trigger != "!count" {
                    return None;
                }
                self.0 += 1;
                Some(format!("the count is {}", self.0))
            }
        }

        let mut state = test::simple_state();
        state.bot = Some(Box::new(CountBot(0)));
        let (a, mut qa) = test::add_registered_client(&mut state, "alice");
        let (b, mut qb) = test::add_registered_client(&mut state, "bob");
        test::sequence(&mut state, &[(a, "JOIN #x"), (b, "JOIN #x")]);
        test::flush(&mut qa);
        test::flush(&mut qb);

        test::handle_line(&mut state, a, "PRIVMSG #x :!count");
        test::handle_line(&mut state, a, "PRIVMSG #x :!nonsense");

        let mut buf = String::new();
        test::collect(&mut buf, &mut qa);
        assert_eq!(buf, ":tern.localdomain NOTICE #x :the count is 1\r\n");
        buf.clear();
        test::collect(&mut buf, &mut qb);
        assert_eq!(buf, ":alice!alice@host PRIVMSG #x :!count\r\n\
                         :tern.localdomain NOTICE #x :the count is 1\r\n\
                         :alice!alice@host PRIVMSG #x :!nonsense\r\n");
    }

    #[test]
    fn channel_departure_reports_promotion() {
        // Sanity check of the departure signal used by the handlers.
        let mut channel = crate::channel::Channel::new();
        channel.add_member(1);
        channel.add_member(2);
        assert_eq!(channel.remove_member(1), Departure::Remaining { promoted: Some(2) });
        assert_eq!(channel.remove_member(2), Departure::Empty);
    }
}
