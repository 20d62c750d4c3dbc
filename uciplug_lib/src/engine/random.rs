use crate::board::{BoardState, Color, Move};
use crate::engine::{Engine, EngineIo};
use crate::error::EngineError;
use crate::messages::{PositionBase, UciCommand};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::{Duration, Instant};

const NAME: &str = "uciplug random mover";
const DEFAULT_THINK_TIME: Duration = Duration::from_millis(100);

enum Thought {
   Finished,
   Quit,
}

/// In-process stand-in for a real engine. Speaks enough UCI to drive the bridge and
/// answers `go` with a random pseudo-move of the side to move: any of its pieces to
/// any square not holding one of its own. It knows nothing about chess rules.
pub struct RandomEngine {
   rng: StdRng,
   position: BoardState,
}

impl RandomEngine {
   pub fn new() -> RandomEngine {
      RandomEngine {
         rng: StdRng::from_entropy(),
         position: BoardState::start(),
      }
   }

   pub fn seeded(seed: u64) -> RandomEngine {
      RandomEngine {
         rng: StdRng::seed_from_u64(seed),
         position: BoardState::start(),
      }
   }

   fn set_position(&mut self, base: PositionBase, moves: &[&str]) {
      let position = match base {
         PositionBase::StartPos => Ok(BoardState::start()),
         PositionBase::Fen(fen) => BoardState::from_fen(&fen),
      };
      match position {
         Ok(position) => self.position = position,
         Err(e) => {
            warn!("ignoring position command: {}", e);
            return;
         }
      }
      for a_move in moves {
         if let Err(e) = self.position.apply_move(a_move) {
            warn!("stopping at move {} of position command: {}", a_move, e);
            break;
         }
      }
   }

   /// Waits out the think time while still answering `isready`, `stop` and `quit`.
   fn think(&self, io: &EngineIo, movetime: Duration) -> Result<Thought, EngineError> {
      let deadline = Instant::now() + movetime;
      while Instant::now() < deadline {
         if !io.is_running() {
            return Ok(Thought::Quit);
         }
         let command = match io.read_line() {
            Some(command) => command,
            None => {
               io.idle();
               continue;
            }
         };
         match command.parse() {
            UciCommand::Stop => break,
            UciCommand::Quit => return Ok(Thought::Quit),
            UciCommand::IsReady => io.write("readyok")?,
            _ => debug!("ignoring {} while thinking", command),
         };
      }
      Ok(Thought::Finished)
   }

   fn candidates(&self) -> Vec<Move> {
      let side = self.position.active_color();
      let squares = self.position.squares();
      let mut candidates = Vec::new();
      for (origin, square) in squares.iter().enumerate() {
         if square.color() != Some(side) {
            continue;
         }
         let is_pawn = matches!(square.piece(), Some('p') | Some('P'));
         for (destination, target) in squares.iter().enumerate() {
            if destination == origin || target.color() == Some(side) {
               continue;
            }
            let promotes = match side {
               Color::White => destination < 8,
               Color::Black => destination >= 56,
            };
            candidates.push(Move {
               origin,
               destination,
               promotion: if is_pawn && promotes { Some('q') } else { None },
            });
         }
      }
      candidates
   }

   fn pick_move(&mut self) -> Option<Move> {
      let candidates = self.candidates();
      candidates.choose(&mut self.rng).copied()
   }
}

impl Default for RandomEngine {
   fn default() -> RandomEngine {
      RandomEngine::new()
   }
}

impl Engine for RandomEngine {
   fn name(&self) -> &str {
      NAME
   }

   fn run(&mut self, io: &EngineIo) -> Result<(), EngineError> {
      while io.is_running() {
         let command = match io.read_line() {
            Some(command) => command,
            None => {
               io.idle();
               continue;
            }
         };
         match command.parse() {
            UciCommand::Uci => {
               io.write(&format!("id name {}", NAME))?;
               io.write("id author uciplug")?;
               io.write("uciok")?;
            }
            UciCommand::IsReady => io.write("readyok")?,
            UciCommand::NewGame => self.position = BoardState::start(),
            UciCommand::Position { base, moves } => self.set_position(base, &moves),
            UciCommand::Go { movetime } => {
               if let Thought::Quit = self.think(io, movetime.unwrap_or(DEFAULT_THINK_TIME))? {
                  return Ok(());
               }
               match self.pick_move() {
                  Some(best_move) => io.write(&format!("bestmove {}", best_move))?,
                  None => io.write("bestmove 0000")?,
               }
            }
            UciCommand::Stop => {}
            UciCommand::Quit => return Ok(()),
            UciCommand::Unknown(text) => debug!("unknown command {:?}", text),
         };
      }
      Ok(())
   }
}
