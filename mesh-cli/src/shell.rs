//! Interactive command parser

use mesh_link::SecondaryPort;
use mesh_protocol::{Button, Destination};
use thiserror::Error;

pub const HELP: &str = "\
Commands:
  press <dev> <1|2>              press a button
  release <dev> <1|2>            release a button
  ping <dev>                     send PING on the primary link
  send <dev> <dest|?|*> <text>   send content (* = every route, ? = known routes)
  pause|resume|step|stop <dev>   control a device
  routes <dev>                   show the routing table
  leds <dev>                     show the LED panel
  connect <a> <port> <b> <port>  link two free secondary ports
  disconnect <dev> <port>        close a secondary port (frees both ends)
  help                           show this text
  quit                           stop every device and exit";

/// Errors from parsing a command line
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShellError {
    #[error("unknown command: {0} (try 'help')")]
    UnknownCommand(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid button: {0} (expected 1 or 2)")]
    InvalidButton(String),

    #[error("invalid port: {0} (expected 0-3)")]
    InvalidPort(String),
}

/// A parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Press { device: String, button: Button },
    Release { device: String, button: Button },
    Ping { device: String },
    Send {
        device: String,
        destination: Destination,
        content: String,
    },
    Pause { device: String },
    Resume { device: String },
    Step { device: String },
    Stop { device: String },
    Routes { device: String },
    Leds { device: String },
    Connect {
        a: String,
        a_port: SecondaryPort,
        b: String,
        b_port: SecondaryPort,
    },
    Disconnect { device: String, port: SecondaryPort },
    Help,
    Quit,
}

fn arg<'a>(
    words: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<&'a str, ShellError> {
    words.next().ok_or(ShellError::MissingArgument(name))
}

fn button(word: &str) -> Result<Button, ShellError> {
    match word {
        "1" => Ok(Button::One),
        "2" => Ok(Button::Two),
        other => Err(ShellError::InvalidButton(other.to_string())),
    }
}

fn port(word: &str) -> Result<SecondaryPort, ShellError> {
    word.parse::<usize>()
        .ok()
        .and_then(SecondaryPort::new)
        .ok_or_else(|| ShellError::InvalidPort(word.to_string()))
}

fn destination(word: &str) -> Destination {
    match word {
        "*" => Destination::All,
        other => Destination::from_field(other),
    }
}

impl ShellCommand {
    /// Parse one input line; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>, ShellError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };

        let command = match verb {
            "press" | "release" => {
                let device = arg(&mut words, "device")?.to_string();
                let button = button(arg(&mut words, "button")?)?;
                if verb == "press" {
                    ShellCommand::Press { device, button }
                } else {
                    ShellCommand::Release { device, button }
                }
            }
            "ping" => ShellCommand::Ping {
                device: arg(&mut words, "device")?.to_string(),
            },
            "send" => {
                let device = arg(&mut words, "device")?.to_string();
                let destination = destination(arg(&mut words, "destination")?);
                let content = words.collect::<Vec<_>>().join(" ");
                if content.is_empty() {
                    return Err(ShellError::MissingArgument("content"));
                }
                ShellCommand::Send {
                    device,
                    destination,
                    content,
                }
            }
            "pause" | "resume" | "step" | "stop" | "routes" | "leds" => {
                let device = arg(&mut words, "device")?.to_string();
                match verb {
                    "pause" => ShellCommand::Pause { device },
                    "resume" => ShellCommand::Resume { device },
                    "step" => ShellCommand::Step { device },
                    "stop" => ShellCommand::Stop { device },
                    "routes" => ShellCommand::Routes { device },
                    _ => ShellCommand::Leds { device },
                }
            }
            "connect" => ShellCommand::Connect {
                a: arg(&mut words, "device")?.to_string(),
                a_port: port(arg(&mut words, "port")?)?,
                b: arg(&mut words, "device")?.to_string(),
                b_port: port(arg(&mut words, "port")?)?,
            },
            "disconnect" => ShellCommand::Disconnect {
                device: arg(&mut words, "device")?.to_string(),
                port: port(arg(&mut words, "port")?)?,
            },
            "help" | "?" => ShellCommand::Help,
            "quit" | "exit" => ShellCommand::Quit,
            other => return Err(ShellError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_blank_line() {
        assert_eq!(ShellCommand::parse("   "), Ok(None));
    }

    #[test]
    fn test_buttons() {
        assert_eq!(
            ShellCommand::parse("press alice 1"),
            Ok(Some(ShellCommand::Press {
                device: "alice".into(),
                button: Button::One
            }))
        );
        assert_eq!(
            ShellCommand::parse("release bob 2"),
            Ok(Some(ShellCommand::Release {
                device: "bob".into(),
                button: Button::Two
            }))
        );
        assert_eq!(
            ShellCommand::parse("press bob 3"),
            Err(ShellError::InvalidButton("3".into()))
        );
    }

    #[test]
    fn test_send_destinations() {
        assert_eq!(
            ShellCommand::parse("send alice * blink leds"),
            Ok(Some(ShellCommand::Send {
                device: "alice".into(),
                destination: Destination::All,
                content: "blink leds".into(),
            }))
        );
        assert_eq!(
            ShellCommand::parse("send alice ? reset"),
            Ok(Some(ShellCommand::Send {
                device: "alice".into(),
                destination: Destination::Known,
                content: "reset".into(),
            }))
        );
        assert_eq!(
            ShellCommand::parse("send alice carol green on"),
            Ok(Some(ShellCommand::Send {
                device: "alice".into(),
                destination: Destination::Device("carol".into()),
                content: "green on".into(),
            }))
        );
        assert_eq!(
            ShellCommand::parse("send alice carol"),
            Err(ShellError::MissingArgument("content"))
        );
    }

    #[test]
    fn test_ports() {
        assert_eq!(
            ShellCommand::parse("connect alice 2 carol 3"),
            Ok(Some(ShellCommand::Connect {
                a: "alice".into(),
                a_port: SecondaryPort::ALL[2],
                b: "carol".into(),
                b_port: SecondaryPort::ALL[3],
            }))
        );
        assert_eq!(
            ShellCommand::parse("disconnect bob 4"),
            Err(ShellError::InvalidPort("4".into()))
        );
        assert_eq!(
            ShellCommand::parse("connect alice 2"),
            Err(ShellError::MissingArgument("device"))
        );
    }

    #[test]
    fn test_control_and_unknown() {
        assert_eq!(
            ShellCommand::parse("step carol"),
            Ok(Some(ShellCommand::Step {
                device: "carol".into()
            }))
        );
        assert_eq!(ShellCommand::parse("quit"), Ok(Some(ShellCommand::Quit)));
        assert_eq!(
            ShellCommand::parse("dance alice"),
            Err(ShellError::UnknownCommand("dance".into()))
        );
        assert_eq!(
            ShellCommand::parse("pause"),
            Err(ShellError::MissingArgument("device"))
        );
    }

    proptest! {
        #[test]
        fn parse_never_panics(line in "\\PC{0,40}") {
            let _ = ShellCommand::parse(&line);
        }

        #[test]
        fn send_keeps_content_words(words in prop::collection::vec("[a-z]{1,8}", 1..5)) {
            let line = format!("send alice * {}", words.join(" "));
            prop_assert_eq!(
                ShellCommand::parse(&line),
                Ok(Some(ShellCommand::Send {
                    device: "alice".into(),
                    destination: Destination::All,
                    content: words.join(" "),
                }))
            );
        }
    }
}
