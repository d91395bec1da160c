#![no_main]

use libfuzzer_sys::fuzz_target;

use votebot::polls::{parse_command, PollCommand};

fuzz_target!(|data: &str| {
    // Any chat message must parse without panicking, and whatever parses
    // must respect the grammar's shape.
    match parse_command(data) {
        Ok(Some(PollCommand::Create { question, options })) => {
            assert!(!question.is_empty());
            assert!(options.len() >= 2);
            assert!(options.iter().all(|o| !o.is_empty()));
        }
        Ok(Some(PollCommand::Vote { poll_id, .. }))
        | Ok(Some(PollCommand::Result { poll_id }))
        | Ok(Some(PollCommand::Close { poll_id }))
        | Ok(Some(PollCommand::Delete { poll_id })) => {
            assert!(!poll_id.contains(' '));
        }
        Ok(Some(PollCommand::Help)) | Ok(None) => {}
        Err(e) => assert!(e.usage().starts_with("/vote ")),
    }
});
