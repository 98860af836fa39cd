// Author: Dustin Pilgrim
// License: MIT

//! Control socket wire format.
//!
//! One connection carries one command: the client writes a short word, the
//! daemon answers with a single line and closes. There is no framing; the
//! daemon does exactly one read of at most [`MAX_COMMAND_BYTES`].

/// Upper bound for a single command read.
pub const MAX_COMMAND_BYTES: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Reload,
    Exit,
    Unknown,
}

impl Command {
    /// Classify raw bytes from one read. Case and surrounding whitespace are ignored.
    pub fn parse(raw: &[u8]) -> Command {
        let Ok(text) = std::str::from_utf8(raw) else {
            return Command::Unknown;
        };

        match lower_simple(text.trim()).as_str() {
            "reload" => Command::Reload,
            "exit" => Command::Exit,
            _ => Command::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Reload => "reload",
            Command::Exit => "exit",
            Command::Unknown => "unknown",
        }
    }
}

/// Simple lowercase mapping, one char per char: 'İ' becomes 'i' and a final 'Σ' becomes 'σ'.
fn lower_simple(s: &str) -> String {
    s.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Response {
    Reloaded,
    Exiting,
    UnknownCommand,
}

impl Response {
    pub fn for_command(cmd: Command) -> Response {
        match cmd {
            Command::Reload => Response::Reloaded,
            Command::Exit => Response::Exiting,
            Command::Unknown => Response::UnknownCommand,
        }
    }

    pub fn line(self) -> &'static str {
        match self {
            Response::Reloaded => "OK reloaded\n",
            Response::Exiting => "OK exiting\n",
            Response::UnknownCommand => "ERR unknown command\n",
        }
    }

    pub fn is_error(line: &str) -> bool {
        line.starts_with("ERR")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_and_whitespace_do_not_matter() {
        for raw in ["reload", "RELOAD ", " Reload\n", "\treLoAd\r\n"] {
            assert_eq!(Command::parse(raw.as_bytes()), Command::Reload, "{raw:?}");
        }
        for raw in ["exit", "EXIT", "  exit\n"] {
            assert_eq!(Command::parse(raw.as_bytes()), Command::Exit, "{raw:?}");
        }
    }

    #[test]
    fn case_folding_is_one_char_per_char() {
        assert_eq!(Command::parse("EXİT".as_bytes()), Command::Exit);
        assert_eq!(Command::parse("RELOAD".as_bytes()), Command::Reload);
        assert_eq!(lower_simple("ΟΔΟΣ"), "οδοσ");
    }

    #[test]
    fn everything_else_is_unknown() {
        for raw in ["", "   ", "\n", "reload now", "re load", "quit", "exit!", "reloadexit"] {
            assert_eq!(Command::parse(raw.as_bytes()), Command::Unknown, "{raw:?}");
        }
    }

    #[test]
    fn invalid_utf8_is_unknown() {
        assert_eq!(Command::parse(&[0xff, 0xfe, b'r']), Command::Unknown);
    }

    #[test]
    fn responses_are_single_lines() {
        assert_eq!(Response::for_command(Command::Reload).line(), "OK reloaded\n");
        assert_eq!(Response::for_command(Command::Exit).line(), "OK exiting\n");
        assert_eq!(Response::for_command(Command::Unknown).line(), "ERR unknown command\n");
        assert!(Response::is_error(Response::UnknownCommand.line()));
        assert!(!Response::is_error(Response::Reloaded.line()));
    }
}
