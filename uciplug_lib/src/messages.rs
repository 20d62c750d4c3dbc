use smallvec::SmallVec;
use std::fmt;
use std::time::Duration;

// Interface to Engine

/// One protocol line headed for the engine. Opaque to the channel that carries it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Command(String);

impl Command {
   pub fn uci() -> Command {
      Command("uci".into())
   }

   pub fn is_ready() -> Command {
      Command("isready".into())
   }

   pub fn new_game() -> Command {
      Command("ucinewgame".into())
   }

   pub fn position_fen(fen: &str) -> Command {
      Command(format!("position fen {}", fen))
   }

   pub fn go_movetime(think_time: Duration) -> Command {
      Command(format!("go movetime {}", think_time.as_millis()))
   }

   pub fn stop() -> Command {
      Command("stop".into())
   }

   pub fn quit() -> Command {
      Command("quit".into())
   }

   pub fn as_str(&self) -> &str {
      &self.0
   }

   pub fn is_quit(&self) -> bool {
      self.0.trim() == "quit"
   }

   /// Engine-side view of the command.
   pub fn parse(&self) -> UciCommand<'_> {
      UciCommand::parse(&self.0)
   }
}

impl fmt::Display for Command {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      f.write_str(&self.0)
   }
}

impl From<String> for Command {
   fn from(text: String) -> Command {
      Command(text)
   }
}

impl From<&str> for Command {
   fn from(text: &str) -> Command {
      Command(text.to_owned())
   }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PositionBase {
   StartPos,
   Fen(String),
}

/// Commands an in-process engine understands. Everything else is `Unknown`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UciCommand<'a> {
   Uci,
   IsReady,
   NewGame,
   Position {
      base: PositionBase,
      moves: SmallVec<[&'a str; 8]>,
   },
   Go {
      movetime: Option<Duration>,
   },
   Stop,
   Quit,
   Unknown(&'a str),
}

impl<'a> UciCommand<'a> {
   pub fn parse(line: &'a str) -> UciCommand<'a> {
      let args: SmallVec<[&str; 16]> = line.split_whitespace().collect();
      match args.first().copied() {
         Some("uci") => UciCommand::Uci,
         Some("isready") => UciCommand::IsReady,
         Some("ucinewgame") => UciCommand::NewGame,
         Some("stop") => UciCommand::Stop,
         Some("quit") => UciCommand::Quit,
         Some("go") => {
            let movetime = args
               .iter()
               .position(|x| *x == "movetime")
               .and_then(|i| args.get(i + 1))
               .and_then(|ms| ms.parse().ok())
               .map(Duration::from_millis);
            UciCommand::Go { movetime }
         }
         Some("position") => {
            let moves_at = args.iter().position(|x| *x == "moves").unwrap_or(args.len());
            let moves = args.iter().skip(moves_at + 1).copied().collect();
            match args.get(1).copied() {
               Some("startpos") => UciCommand::Position {
                  base: PositionBase::StartPos,
                  moves,
               },
               Some("fen") if moves_at > 2 => UciCommand::Position {
                  base: PositionBase::Fen(args[2..moves_at].join(" ")),
                  moves,
               },
               _ => UciCommand::Unknown(line),
            }
         }
         _ => UciCommand::Unknown(line),
      }
   }
}

// Engine to Interface

/// True for the reply that completes an `isready` round trip.
pub fn is_ready_ok(line: &str) -> bool {
   line.trim() == "readyok"
}
