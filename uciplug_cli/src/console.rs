use log::{debug, error};
use std::io::{self, BufRead};
use std::sync::mpsc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
   /// Ask the engine for a move in the current position.
   Go(Option<Duration>),
   Move(String),
   Reset,
   Fen(String),
   Board,
   Status,
   /// Raw protocol line, passed through untouched.
   Send(String),
   Uci,
   NewGame,
   Stop,
   Quit,
}

pub const HELP: &str = "commands: go [ms], move <uci>, reset, fen <FEN>, board, status, send <raw>, uci, new, stop, quit";

/// Parses one console line. Blank lines give `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, String> {
   let line = line.trim();
   let (verb, rest) = match line.split_once(char::is_whitespace) {
      Some((verb, rest)) => (verb, rest.trim()),
      None => (line, ""),
   };

   let command = match verb {
      "" => return Ok(None),
      "go" => {
         if rest.is_empty() {
            ConsoleCommand::Go(None)
         } else {
            let ms: u64 = rest.parse().map_err(|_| format!("expected a think time in milliseconds, got {:?}", rest))?;
            ConsoleCommand::Go(Some(Duration::from_millis(ms)))
         }
      }
      "move" => {
         if rest.is_empty() {
            return Err("expected a move after 'move', e.g. move e2e4".into());
         }
         ConsoleCommand::Move(rest.to_owned())
      }
      "fen" => {
         if rest.is_empty() {
            return Err("expected a FEN after 'fen'".into());
         }
         ConsoleCommand::Fen(rest.to_owned())
      }
      "send" => {
         if rest.is_empty() {
            return Err("expected a protocol line after 'send'".into());
         }
         ConsoleCommand::Send(rest.to_owned())
      }
      "reset" => ConsoleCommand::Reset,
      "board" => ConsoleCommand::Board,
      "status" => ConsoleCommand::Status,
      "uci" => ConsoleCommand::Uci,
      "new" => ConsoleCommand::NewGame,
      "stop" => ConsoleCommand::Stop,
      "quit" | "exit" => ConsoleCommand::Quit,
      _ => return Err(format!("unknown command {:?}; {}", verb, HELP)),
   };
   Ok(Some(command))
}

/// Reads stdin until EOF, handing each line to the tick loop.
pub fn read_loop(sender: mpsc::Sender<String>) {
   let stdin = io::stdin();
   let mut in_handle = stdin.lock();
   let mut line_buf = String::new();

   loop {
      line_buf.clear();
      match in_handle.read_line(&mut line_buf) {
         Ok(0) => {
            debug!("console input closed");
            break;
         }
         Ok(_) => {
            if sender.send(line_buf.clone()).is_err() {
               break;
            }
         }
         Err(e) => {
            error!("Encountered I/O error reading console input: {}", e);
            break;
         }
      }
   }
}
