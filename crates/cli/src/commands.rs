//! Slash commands understood at the prompt

use voice_tutor_core::InteractionMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    /// Switch interaction mode
    Mode(InteractionMode),
    /// Toggle spoken replies
    Mute,
    Profile,
    Transcript,
    /// Start simulated capture; typed lines are heard as speech
    Listen,
    /// Stop capture and send what was heard
    Send,
    /// Clear the microphone warning
    Dismiss,
}

/// Parse a prompt line
///
/// Returns `None` for lines that are not commands. Malformed commands
/// produce a message for the learner.
pub fn parse(line: &str) -> Option<Result<Command, String>> {
    let line = line.trim();
    let rest = line.strip_prefix('/')?;
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name.to_lowercase().as_str() {
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        "mute" => Ok(Command::Mute),
        "profile" => Ok(Command::Profile),
        "transcript" => Ok(Command::Transcript),
        "listen" => Ok(Command::Listen),
        "send" => Ok(Command::Send),
        "dismiss" => Ok(Command::Dismiss),
        "mode" if arg.is_empty() => Err(format!("usage: /mode <{}>", mode_names())),
        "mode" => arg.parse().map(Command::Mode),
        other => Err(format!("unknown command /{}; try /help", other)),
    };
    Some(command)
}

fn mode_names() -> String {
    InteractionMode::all()
        .iter()
        .map(|m| m.as_str().to_lowercase())
        .collect::<Vec<_>>()
        .join("|")
}

pub const HELP: &str = "\
Type a message and press enter to send it.
  /listen       start listening; lines you type are heard as speech
  /send         stop listening and send what was heard
  /mode <mode>  conversation, vocabulary, grammar or roleplay
  /mute         toggle spoken replies
  /profile      show your learner profile
  /transcript   show the conversation so far
  /dismiss      clear the microphone warning
  /quit         save progress and leave";
