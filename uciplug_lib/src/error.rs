use std::io;
use thiserror::Error;

/// Why a move token was refused by the board.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MoveError {
   #[error("a move has to be 4-5 characters long, got {0}")]
   BadLength(usize),
   #[error("malformed move {0:?}; expected file, rank, file, rank and an optional promotion letter")]
   BadFormat(String),
   #[error("{0} is not a square on the board")]
   OffBoard(String),
   #[error("there is no piece on {0}")]
   EmptySource(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FenError {
   #[error("malformed FEN; expected at least 2 whitespace delimited sections, found {0}")]
   MissingFields(usize),
   #[error("malformed FEN; expected 8 ranks in piece placement, found {0}")]
   RankCount(usize),
   #[error("malformed FEN; rank {rank} describes {squares} squares instead of 8")]
   RankWidth { rank: usize, squares: usize },
   #[error("malformed FEN; {0:?} is not a valid run of empty squares, expected 1..=8")]
   BadRun(char),
   #[error("malformed FEN; expected w or b for the side to move, found {0:?}")]
   ActiveColor(String),
}

/// Failures inside the engine thread. Any of these ends the engine loop.
#[derive(Debug, Error)]
pub enum EngineError {
   #[error("failed to spawn engine process {program}: {source}")]
   Spawn {
      program: String,
      #[source]
      source: io::Error,
   },
   #[error("engine process was started without a {0} pipe")]
   MissingPipe(&'static str),
   #[error("engine process closed its output")]
   Exited,
   #[error("nobody is reading engine output anymore")]
   Disconnected,
   #[error("engine i/o failed: {0}")]
   Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum BridgeError {
   #[error("engine is not running")]
   NotRunning,
   #[error("engine is already running")]
   AlreadyRunning,
   #[error("failed to start the engine thread: {0}")]
   Spawn(#[from] io::Error),
   #[error("bad starting position: {0}")]
   StartPosition(#[from] FenError),
}
