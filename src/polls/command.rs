//! `/vote` command parsing
//!
//! Turns one chat message into a typed [`PollCommand`]. Messages that do not
//! start with the `/vote` token, or name an unknown subcommand, parse to
//! `Ok(None)` and get no reply at all.

use thiserror::Error;

/// Leading token that addresses the poll feature
pub const COMMAND_PREFIX: &str = "/vote";

/// Separator between the question and options of `create`
const CREATE_SEPARATOR: &str = ", ";

pub const CREATE_USAGE: &str = "/vote create <question>, <option1>, <option2>, ...";
pub const SEND_USAGE: &str = "/vote send <poll id> <option number>";
pub const RESULT_USAGE: &str = "/vote result <poll id>";
pub const CLOSE_USAGE: &str = "/vote close <poll id>";
pub const DELETE_USAGE: &str = "/vote delete <poll id>";

/// Static usage text for `/vote help`
pub const HELP_TEXT: &str = "\
Available poll commands:

1. /vote create <question>, <option1>, <option2>, ... - create a new poll with a question and options.
2. /vote send <poll id> <option number> - vote for one of the options.
3. /vote result <poll id> - show the current results.
4. /vote close <poll id> - end voting (poll creator only).
5. /vote delete <poll id> - delete the poll (poll creator only).
6. /vote help - show this message.

Examples:
- /vote create What is your favourite color?, Red, Blue, Green
- /vote send 12345 2
- /vote result 12345
";

/// A parsed poll command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollCommand {
    /// Create a poll
    Create {
        question: String,
        options: Vec<String>,
    },
    /// Vote for the option at a 1-based position
    Vote { poll_id: String, position: i64 },
    /// Show results
    Result { poll_id: String },
    /// Close a poll
    Close { poll_id: String },
    /// Delete a poll
    Delete { poll_id: String },
    /// Show usage
    Help,
}

impl PollCommand {
    /// Subcommand keyword
    pub fn name(&self) -> &'static str {
        match self {
            PollCommand::Create { .. } => "create",
            PollCommand::Vote { .. } => "send",
            PollCommand::Result { .. } => "result",
            PollCommand::Close { .. } => "close",
            PollCommand::Delete { .. } => "delete",
            PollCommand::Help => "help",
        }
    }
}

/// Command parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Malformed command, usage: {usage}")]
    Malformed { usage: &'static str },
}

impl CommandError {
    /// Usage hint for the subcommand that failed to parse
    pub fn usage(&self) -> &'static str {
        match self {
            CommandError::Malformed { usage } => usage,
        }
    }
}

/// Parse a chat message into a poll command
pub fn parse_command(text: &str) -> Result<Option<PollCommand>, CommandError> {
    let tokens: Vec<&str> = text.split(' ').collect();
    if tokens.first() != Some(&COMMAND_PREFIX) {
        return Ok(None);
    }

    let command = match tokens.get(1).copied() {
        Some("create") => parse_create(text)?,
        Some("send") => {
            let [_, _, poll_id, position] = tokens[..] else {
                return Err(malformed(SEND_USAGE));
            };
            let position = position.parse().map_err(|_| malformed(SEND_USAGE))?;
            PollCommand::Vote {
                poll_id: poll_id.to_string(),
                position,
            }
        }
        Some("result") => PollCommand::Result {
            poll_id: single_argument(&tokens, RESULT_USAGE)?,
        },
        Some("close") => PollCommand::Close {
            poll_id: single_argument(&tokens, CLOSE_USAGE)?,
        },
        Some("delete") => PollCommand::Delete {
            poll_id: single_argument(&tokens, DELETE_USAGE)?,
        },
        Some("help") => PollCommand::Help,
        _ => return Ok(None),
    };

    Ok(Some(command))
}

fn parse_create(text: &str) -> Result<PollCommand, CommandError> {
    let body = text
        .strip_prefix(COMMAND_PREFIX)
        .and_then(|rest| rest.strip_prefix(" create "))
        .ok_or(malformed(CREATE_USAGE))?;

    let mut segments = body.split(CREATE_SEPARATOR).map(str::to_string);
    let question = segments.next().unwrap_or_default();
    let options: Vec<String> = segments.collect();

    if options.len() < 2 || question.is_empty() || options.iter().any(String::is_empty) {
        return Err(malformed(CREATE_USAGE));
    }

    Ok(PollCommand::Create { question, options })
}

fn single_argument(tokens: &[&str], usage: &'static str) -> Result<String, CommandError> {
    match tokens {
        [_, _, poll_id] => Ok(poll_id.to_string()),
        _ => Err(malformed(usage)),
    }
}

fn malformed(usage: &'static str) -> CommandError {
    CommandError::Malformed { usage }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create() {
        let cmd = parse_command("/vote create Color?, Red, Blue, Green").unwrap();
        assert_eq!(
            cmd,
            Some(PollCommand::Create {
                question: "Color?".to_string(),
                options: vec!["Red".into(), "Blue".into(), "Green".into()],
            })
        );
    }

    #[test]
    fn test_parse_create_needs_two_options() {
        let err = parse_command("/vote create Q, A").unwrap_err();
        assert_eq!(err.usage(), CREATE_USAGE);
        assert!(parse_command("/vote create Q").is_err());
        assert!(parse_command("/vote create").is_err());
    }

    #[test]
    fn test_parse_create_splits_on_comma_space_only() {
        // "A,B" has no comma-space so it is a single option
        assert!(parse_command("/vote create Q, A,B").is_err());

        let cmd = parse_command("/vote create Q,  A, B").unwrap();
        assert_eq!(
            cmd,
            Some(PollCommand::Create {
                question: "Q".to_string(),
                options: vec![" A".into(), "B".into()],
            })
        );
    }

    #[test]
    fn test_parse_create_rejects_empty_segments() {
        assert!(parse_command("/vote create , A, B").is_err());
        assert!(parse_command("/vote create Q, , B").is_err());
    }

    #[test]
    fn test_parse_send() {
        let cmd = parse_command("/vote send 12345 2").unwrap();
        assert_eq!(
            cmd,
            Some(PollCommand::Vote {
                poll_id: "12345".to_string(),
                position: 2,
            })
        );

        // Range is the engine's concern
        let cmd = parse_command("/vote send 12345 -3").unwrap();
        assert!(matches!(cmd, Some(PollCommand::Vote { position: -3, .. })));
    }

    #[test]
    fn test_parse_send_malformed() {
        assert_eq!(
            parse_command("/vote send 12345 x"),
            Err(CommandError::Malformed { usage: SEND_USAGE })
        );
        assert!(parse_command("/vote send 12345").is_err());
        assert!(parse_command("/vote send 12345 1 2").is_err());
        assert!(parse_command("/vote send  12345 1").is_err());
    }

    #[test]
    fn test_parse_single_argument_commands() {
        assert_eq!(
            parse_command("/vote result 12345").unwrap(),
            Some(PollCommand::Result {
                poll_id: "12345".to_string()
            })
        );
        assert_eq!(
            parse_command("/vote close abc").unwrap(),
            Some(PollCommand::Close {
                poll_id: "abc".to_string()
            })
        );
        assert_eq!(
            parse_command("/vote delete abc").unwrap(),
            Some(PollCommand::Delete {
                poll_id: "abc".to_string()
            })
        );
    }

    #[test]
    fn test_parse_single_argument_wrong_count() {
        assert_eq!(
            parse_command("/vote result"),
            Err(CommandError::Malformed {
                usage: RESULT_USAGE
            })
        );
        assert!(parse_command("/vote close a b").is_err());
        assert!(parse_command("/vote delete").is_err());
    }

    #[test]
    fn test_parse_help() {
        assert_eq!(parse_command("/vote help").unwrap(), Some(PollCommand::Help));
        assert_eq!(
            parse_command("/vote help me").unwrap(),
            Some(PollCommand::Help)
        );
    }

    #[test]
    fn test_unrelated_messages_are_ignored() {
        assert_eq!(parse_command("hello there").unwrap(), None);
        assert_eq!(parse_command("").unwrap(), None);
        assert_eq!(parse_command("/voter create Q, A, B").unwrap(), None);
        assert_eq!(parse_command("/vote").unwrap(), None);
        assert_eq!(parse_command("/vote frobnicate 1").unwrap(), None);
        // Keywords are case-sensitive
        assert_eq!(parse_command("/vote Create Q, A, B").unwrap(), None);
        assert_eq!(parse_command("/VOTE help").unwrap(), None);
    }

    #[test]
    fn test_command_names() {
        assert_eq!(PollCommand::Help.name(), "help");
        let vote = PollCommand::Vote {
            poll_id: "p".into(),
            position: 1,
        };
        assert_eq!(vote.name(), "send");
    }
}
