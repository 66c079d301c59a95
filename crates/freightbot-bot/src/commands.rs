//! Chat command grammar.

use freightbot_core::types::NotifyCategory;

/// Everything the bot understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Help,
    Active,
    Today,
    Contacts,
    DbStatus,
    Subscribe,
    Unsubscribe,
    /// Free-text search; empty string means "show usage".
    Search(String),
    /// Status filter; empty string means "show usage".
    Status(String),
    /// Summary over N days, default 30.
    Summary(Option<i64>),
    /// Order report document; empty string means "show usage".
    Report(String),
    SettingsShow,
    SettingsLead(i64),
    SettingsToggle(NotifyCategory, bool),
    Unknown(String),
}

/// Parse a chat message into a command. Non-command text returns `None`.
/// A trailing `@botname` on the command word is ignored, as Telegram
/// appends one in group chats.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }
    let mut parts = text.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or_default();
    let head = head.split('@').next().unwrap_or(head);
    let rest = parts.next().unwrap_or("").trim();

    let command = match head {
        "/start" => Command::Start,
        "/help" => Command::Help,
        "/active" => Command::Active,
        "/today" => Command::Today,
        "/contacts" => Command::Contacts,
        "/dbstatus" => Command::DbStatus,
        "/subscribe" => Command::Subscribe,
        "/unsubscribe" => Command::Unsubscribe,
        "/search" => Command::Search(rest.to_string()),
        "/status" => Command::Status(rest.to_string()),
        "/summary" => Command::Summary(rest.parse().ok().filter(|d| *d > 0)),
        "/report" => Command::Report(rest.to_string()),
        "/settings" => parse_settings(rest),
        other => Command::Unknown(other.to_string()),
    };
    Some(command)
}

fn parse_settings(rest: &str) -> Command {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("lead"), Some(hours)) => match hours.parse::<i64>() {
            // Anything from one hour to thirty days.
            Ok(h) if (1..=720).contains(&h) => Command::SettingsLead(h),
            _ => Command::SettingsShow,
        },
        (Some(category), Some(flag @ ("on" | "off"))) => {
            let category = match category {
                "events" => Some(NotifyCategory::Events),
                "reminders" => Some(NotifyCategory::Reminders),
                "alerts" => Some(NotifyCategory::Alerts),
                _ => None,
            };
            match category {
                Some(c) => Command::SettingsToggle(c, flag == "on"),
                None => Command::SettingsShow,
            }
        }
        _ => Command::SettingsShow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(parse_command("hello there"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_basic_commands() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/active"), Some(Command::Active));
        assert_eq!(parse_command("  /today  "), Some(Command::Today));
        assert_eq!(
            parse_command("/nosuch"),
            Some(Command::Unknown("/nosuch".into()))
        );
    }

    #[test]
    fn test_botname_suffix_is_stripped() {
        assert_eq!(parse_command("/active@freightbot"), Some(Command::Active));
    }

    #[test]
    fn test_commands_with_arguments() {
        assert_eq!(
            parse_command("/search ORD-001"),
            Some(Command::Search("ORD-001".into()))
        );
        assert_eq!(parse_command("/search"), Some(Command::Search(String::new())));
        assert_eq!(
            parse_command("/status In Progress"),
            Some(Command::Status("In Progress".into()))
        );
        assert_eq!(parse_command("/summary 7"), Some(Command::Summary(Some(7))));
        assert_eq!(parse_command("/summary"), Some(Command::Summary(None)));
        assert_eq!(parse_command("/summary soon"), Some(Command::Summary(None)));
        assert_eq!(
            parse_command("/report ORD-001"),
            Some(Command::Report("ORD-001".into()))
        );
    }

    #[test]
    fn test_settings_grammar() {
        assert_eq!(parse_command("/settings"), Some(Command::SettingsShow));
        assert_eq!(
            parse_command("/settings lead 48"),
            Some(Command::SettingsLead(48))
        );
        assert_eq!(parse_command("/settings lead 0"), Some(Command::SettingsShow));
        assert_eq!(
            parse_command("/settings lead 10000"),
            Some(Command::SettingsShow)
        );
        assert_eq!(
            parse_command("/settings reminders off"),
            Some(Command::SettingsToggle(NotifyCategory::Reminders, false))
        );
        assert_eq!(
            parse_command("/settings alerts on"),
            Some(Command::SettingsToggle(NotifyCategory::Alerts, true))
        );
        assert_eq!(
            parse_command("/settings bogus on"),
            Some(Command::SettingsShow)
        );
    }
}
